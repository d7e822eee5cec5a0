//! Gateway connection supervisor
//!
//! Every configured gateway gets its own task cycling through
//! `Connecting -> Connected -> Disconnected -> Connecting ...` forever:
//!
//! - a failed connect waits one idle timeout before the next attempt
//! - a connected link feeds every inbound event into the [`StateStore`]
//! - no traffic for one idle timeout, or the inbound stream ending, drops the
//!   link, waits a short cooldown and reconnects
//!
//! Gateways never affect each other. Cancellation is observed at every wait.

use crate::address::GroupEvent;
use crate::client::{BusTransport, GatewayLink};
use crate::error::{KnxError, Result};
use crate::storage::{LinkState, StateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause between dropping a link and reconnecting
pub const RECONNECT_COOLDOWN: Duration = Duration::from_secs(1);

/// Owns the gateway links and routes outbound events to them
pub struct GatewaySupervisor {
    store: Arc<StateStore>,
    transport: Arc<dyn BusTransport>,
    idle_timeout: Duration,
    cooldown: Duration,
}

impl GatewaySupervisor {
    pub fn new(
        store: Arc<StateStore>,
        transport: Arc<dyn BusTransport>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            idle_timeout,
            cooldown: RECONNECT_COOLDOWN,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Start one supervision task per gateway
    pub fn spawn_all(
        self: &Arc<Self>,
        gateways: &[String],
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        gateways
            .iter()
            .map(|gateway| {
                let supervisor = Arc::clone(self);
                let gateway = gateway.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { supervisor.run_gateway(gateway, cancel).await })
            })
            .collect()
    }

    /// Supervise one gateway until `cancel` fires
    pub async fn run_gateway(&self, gateway: String, cancel: CancellationToken) {
        self.store.set_status(&gateway, LinkState::Idle).await;

        loop {
            self.store.set_status(&gateway, LinkState::Connecting).await;
            info!("Establishing connection to KNX gateway {gateway}...");

            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.transport.connect(&gateway) => result,
            };
            let GatewayLink { mut inbound, handle } = match connected {
                Ok(link) => link,
                Err(e) => {
                    warn!(
                        "Cannot connect to {gateway}: {e}, retrying in {:?}",
                        self.idle_timeout
                    );
                    self.store.set_status(&gateway, LinkState::Disconnected).await;
                    if sleep_or_cancel(self.idle_timeout, &cancel).await {
                        break;
                    }
                    continue;
                }
            };

            self.store.register(&gateway, handle.clone()).await;
            info!("✅ Connected to KNX gateway {gateway}");

            let cancelled = self.pump_events(&gateway, &mut inbound, &cancel).await;

            self.store.unregister(&gateway).await;
            handle.close().await;
            if cancelled || sleep_or_cancel(self.cooldown, &cancel).await {
                break;
            }
        }

        self.store.set_status(&gateway, LinkState::Disconnected).await;
        info!("Stopped supervising {gateway}");
    }

    /// Ingest inbound events until the link stalls or ends; true when cancelled
    async fn pump_events(
        &self,
        gateway: &str,
        inbound: &mut mpsc::Receiver<GroupEvent>,
        cancel: &CancellationToken,
    ) -> bool {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return true,
                received = tokio::time::timeout(self.idle_timeout, inbound.recv()) => match received {
                    Ok(Some(event)) => {
                        self.store.ingest(gateway, event).await;
                    }
                    Ok(None) => {
                        warn!("Gateway {gateway} closed the link");
                        return false;
                    }
                    Err(_) => {
                        warn!(
                            "Gateway {gateway}: no traffic for {:?}, reconnecting",
                            self.idle_timeout
                        );
                        return false;
                    }
                },
            }
        }
    }

    /// Send through the live link of `gateway`
    pub async fn send(&self, gateway: &str, event: &GroupEvent) -> Result<()> {
        let handle = self
            .store
            .connection(gateway)
            .await
            .ok_or_else(|| KnxError::gateway_unavailable(gateway))?;
        debug!("Sending {} to {gateway}", event.destination);
        handle.send(event).await.map_err(|e| match e {
            KnxError::TransportSend(_) => e,
            other => KnxError::transport_send(other.to_string()),
        })
    }
}

/// Sleep for `duration`; true when cancelled first
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
