//! Snapshot persistence of the latest value per address
//!
//! The snapshot is a JSON object keyed by group address. It is written to a
//! sibling temp file first and then renamed over the previous snapshot.

use super::{ObservedMessage, StateStore};
use crate::address::GroupAddr;
use crate::error::{KnxError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Interval between periodic snapshots
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write the latest map of `store` to `path`, returning the number of entries
pub async fn save_snapshot(store: &StateStore, path: &Path) -> Result<usize> {
    let latest = store.snapshot_latest().await;
    let body = serde_json::to_vec_pretty(&latest)?;

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, &body)
        .await
        .map_err(|e| KnxError::snapshot(format!("cannot write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        KnxError::snapshot(format!(
            "cannot replace {} with {}: {e}",
            path.display(),
            tmp.display()
        ))
    })?;

    debug!("Saved {} entries to {}", latest.len(), path.display());
    Ok(latest.len())
}

/// Read a snapshot; a missing file yields `None`
pub async fn load_snapshot(path: &Path) -> Result<Option<BTreeMap<GroupAddr, ObservedMessage>>> {
    let body = match tokio::fs::read(path).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(KnxError::snapshot(format!(
                "cannot read {}: {e}",
                path.display()
            )))
        }
    };
    let latest = serde_json::from_slice(&body)
        .map_err(|e| KnxError::snapshot(format!("corrupt snapshot {}: {e}", path.display())))?;
    Ok(Some(latest))
}

/// Load `path` into `store`; failures are logged and leave the store empty
pub async fn restore_snapshot(store: &StateStore, path: &Path) -> usize {
    match load_snapshot(path).await {
        Ok(Some(latest)) => {
            let count = latest.len();
            store.restore(latest).await;
            info!("Restored {count} addresses from {}", path.display());
            count
        }
        Ok(None) => {
            info!("No snapshot at {}, starting empty", path.display());
            0
        }
        Err(e) => {
            warn!("Ignoring snapshot: {e}");
            0
        }
    }
}

/// Save every `interval` until cancelled, then save one last time
pub fn spawn_snapshot_task(
    store: Arc<StateStore>,
    path: PathBuf,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = save_snapshot(&store, &path).await {
                        warn!("Snapshot failed: {e}");
                    }
                }
            }
        }

        match save_snapshot(&store, &path).await {
            Ok(count) => info!("Saved {count} addresses to {} on shutdown", path.display()),
            Err(e) => warn!("Final snapshot failed: {e}"),
        }
    })
}
