//! Shared state of the bridge
//!
//! One `RwLock` guards the latest message per address, the history, the
//! sorted index of known addresses and the registry of live gateway links.
//! Critical sections only touch these in-memory structures; formatting,
//! logging and network I/O happen outside the lock.

use super::ObservedMessage;
use crate::address::{GroupAddr, GroupEvent};
use crate::client::GatewayHandle;
use crate::logging::TRAFFIC_TARGET;
use crate::resolver::PointCatalog;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Lifecycle state of one gateway link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Idle => "idle",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

#[derive(Default)]
struct Inner {
    latest: HashMap<GroupAddr, ObservedMessage>,
    history: Vec<ObservedMessage>,
    /// Always sorted, duplicate free and equal to the key set of `latest`
    known_order: Vec<GroupAddr>,
    links: HashMap<String, Arc<dyn GatewayHandle>>,
    status: BTreeMap<String, LinkState>,
}

impl Inner {
    fn record(&mut self, msg: ObservedMessage) -> bool {
        let dest = msg.event.destination;
        self.history.push(msg.clone());
        let is_new = self.latest.insert(dest, msg).is_none();
        if is_new {
            if let Err(pos) = self.known_order.binary_search(&dest) {
                self.known_order.insert(pos, dest);
            }
        }
        is_new
    }
}

/// Concurrency-safe cache of observed traffic
pub struct StateStore {
    inner: RwLock<Inner>,
    catalog: Arc<PointCatalog>,
}

impl StateStore {
    pub fn new(catalog: Arc<PointCatalog>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            catalog,
        }
    }

    pub fn catalog(&self) -> &Arc<PointCatalog> {
        &self.catalog
    }

    /// Record an event received from (or written through) `gateway`
    pub async fn ingest(&self, gateway: &str, event: GroupEvent) -> ObservedMessage {
        let msg = ObservedMessage::now(gateway, event);
        let is_new = self.inner.write().await.record(msg.clone());

        if is_new {
            info!("New destination group addr: {}", msg.event.destination);
        }
        info!(target: TRAFFIC_TARGET, "{}", self.catalog.describe(&msg));
        msg
    }

    /// Most recently ingested message overall
    pub async fn latest(&self) -> Option<ObservedMessage> {
        self.inner.read().await.history.last().cloned()
    }

    /// Latest message of every known address, ascending by address
    pub async fn all_latest(&self) -> Vec<ObservedMessage> {
        let inner = self.inner.read().await;
        inner
            .known_order
            .iter()
            .filter_map(|addr| inner.latest.get(addr).cloned())
            .collect()
    }

    /// Latest message for one address
    pub async fn latest_of(&self, addr: GroupAddr) -> Option<ObservedMessage> {
        self.inner.read().await.latest.get(&addr).cloned()
    }

    /// Latest message of each of `addrs` that has been observed, in the given order
    pub async fn latest_for(&self, addrs: &[GroupAddr]) -> Vec<ObservedMessage> {
        let inner = self.inner.read().await;
        addrs
            .iter()
            .filter_map(|addr| inner.latest.get(addr).cloned())
            .collect()
    }

    /// Every historical message addressed to one of `addrs`, in arrival order
    pub async fn history_for(&self, addrs: &[GroupAddr]) -> Vec<ObservedMessage> {
        let inner = self.inner.read().await;
        inner
            .history
            .iter()
            .filter(|msg| addrs.contains(&msg.event.destination))
            .cloned()
            .collect()
    }

    pub async fn history_len(&self) -> usize {
        self.inner.read().await.history.len()
    }

    pub async fn known_addresses(&self) -> Vec<GroupAddr> {
        self.inner.read().await.known_order.clone()
    }

    /// Copy of the latest map for persistence
    pub async fn snapshot_latest(&self) -> BTreeMap<GroupAddr, ObservedMessage> {
        let inner = self.inner.read().await;
        inner
            .latest
            .iter()
            .map(|(addr, msg)| (*addr, msg.clone()))
            .collect()
    }

    /// Replace the latest map (history is left untouched) and rebuild the index
    pub async fn restore(&self, latest: BTreeMap<GroupAddr, ObservedMessage>) {
        let mut inner = self.inner.write().await;
        inner.known_order = latest.keys().copied().collect();
        inner.latest = latest.into_iter().collect();
    }

    pub(crate) async fn register(&self, gateway: &str, handle: Arc<dyn GatewayHandle>) {
        let mut inner = self.inner.write().await;
        inner.links.insert(gateway.to_string(), handle);
        inner.status.insert(gateway.to_string(), LinkState::Connected);
    }

    pub(crate) async fn unregister(&self, gateway: &str) -> Option<Arc<dyn GatewayHandle>> {
        let mut inner = self.inner.write().await;
        inner
            .status
            .insert(gateway.to_string(), LinkState::Disconnected);
        inner.links.remove(gateway)
    }

    pub(crate) async fn connection(&self, gateway: &str) -> Option<Arc<dyn GatewayHandle>> {
        self.inner.read().await.links.get(gateway).cloned()
    }

    pub(crate) async fn set_status(&self, gateway: &str, state: LinkState) {
        self.inner
            .write()
            .await
            .status
            .insert(gateway.to_string(), state);
    }

    /// Link state of every gateway that has a supervisor
    pub async fn link_states(&self) -> BTreeMap<String, LinkState> {
        self.inner.read().await.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::GroupCommand;
    use pretty_assertions::assert_eq;

    fn event(dest: &str, data: Vec<u8>) -> GroupEvent {
        GroupEvent {
            command: GroupCommand::Write,
            source: "1.1.1".parse().unwrap(),
            destination: dest.parse().unwrap(),
            data,
        }
    }

    fn store() -> StateStore {
        StateStore::new(Arc::new(PointCatalog::default()))
    }

    #[tokio::test]
    async fn test_known_order_sorted_and_unique() {
        let store = store();
        for dest in ["3/0/1", "1/0/0", "2/5/7", "1/0/0", "0/0/9", "3/0/1"] {
            store.ingest("gw-a", event(dest, vec![0, 1])).await;
        }
        let known: Vec<String> = store
            .known_addresses()
            .await
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(known, vec!["0/0/9", "1/0/0", "2/5/7", "3/0/1"]);

        let latest_keys: Vec<GroupAddr> = store.snapshot_latest().await.into_keys().collect();
        assert_eq!(latest_keys, store.known_addresses().await);
        assert_eq!(store.history_len().await, 6);
    }

    #[tokio::test]
    async fn test_last_write_wins_across_gateways() {
        let store = store();
        store.ingest("gw-a", event("2/5/7", vec![0, 1])).await;
        store.ingest("gw-b", event("2/5/7", vec![0, 2])).await;
        let latest = store.latest_of("2/5/7".parse().unwrap()).await.unwrap();
        assert_eq!(latest.gateway, "gw-b");
        assert_eq!(latest.event.data, vec![0, 2]);
        assert_eq!(store.latest().await.unwrap(), latest);
    }

    #[tokio::test]
    async fn test_queries() {
        let store = store();
        assert!(store.latest().await.is_none());
        assert!(store.all_latest().await.is_empty());

        store.ingest("gw", event("2/0/0", vec![1])).await;
        store.ingest("gw", event("1/0/0", vec![0])).await;
        store.ingest("gw", event("2/0/0", vec![0])).await;

        let all = store.all_latest().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event.destination.to_string(), "1/0/0");
        assert_eq!(all[1].event.data, vec![0]);

        let addr: GroupAddr = "2/0/0".parse().unwrap();
        let history = store.history_for(&[addr]).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].event.data, vec![1]);

        let unseen: GroupAddr = "9/9/9".parse().unwrap();
        assert_eq!(store.latest_for(&[unseen, addr]).await.len(), 1);
    }

    #[tokio::test]
    async fn test_restore_rebuilds_index() {
        let source = store();
        source.ingest("gw", event("4/0/0", vec![1])).await;
        source.ingest("gw", event("0/1/0", vec![0])).await;
        let snapshot = source.snapshot_latest().await;

        let target = store();
        target.restore(snapshot).await;
        assert_eq!(target.known_addresses().await, source.known_addresses().await);
        assert_eq!(target.history_len().await, 0);
        assert!(target.latest_of("4/0/0".parse().unwrap()).await.is_some());

        // new traffic keeps the index sorted after a restore
        target.ingest("gw", event("2/0/0", vec![1])).await;
        let known: Vec<String> = target
            .known_addresses()
            .await
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(known, vec!["0/1/0", "2/0/0", "4/0/0"]);
    }

    #[tokio::test]
    async fn test_concurrent_ingest() {
        let store = Arc::new(store());
        let mut tasks = Vec::new();
        for gw in 0..4 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for sub in 0..50u8 {
                    let dest = GroupAddr::new(1, gw, sub);
                    store
                        .ingest(&format!("gw-{gw}"), GroupEvent::write(dest, vec![0, sub]))
                        .await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let known = store.known_addresses().await;
        assert_eq!(known.len(), 200);
        assert!(known.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(store.history_len().await, 200);
    }
}
