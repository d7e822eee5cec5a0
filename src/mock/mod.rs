//! Mock implementations for testing
//!
//! [`MockTransport`] stands in for real gateways: tests decide which gateways
//! are reachable, inject inbound events, hang links up and inspect what was
//! sent.

use crate::address::GroupEvent;
use crate::client::{BusTransport, GatewayHandle, GatewayLink, INBOUND_CAPACITY};
use crate::error::{KnxError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Default)]
struct MockState {
    unreachable: HashSet<String>,
    /// Current link per gateway: link id and inbound sender
    links: HashMap<String, (u64, mpsc::Sender<GroupEvent>)>,
    next_id: u64,
    connects: HashMap<String, usize>,
    sent: Vec<(String, GroupEvent)>,
    fail_sends: bool,
}

/// Scriptable in-process transport
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // a panicking test must not poison the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Gateways are reachable unless marked otherwise
    pub fn set_reachable(&self, gateway: &str, reachable: bool) {
        let mut state = self.state();
        if reachable {
            state.unreachable.remove(gateway);
        } else {
            state.unreachable.insert(gateway.to_string());
        }
    }

    /// Make every outbound send fail
    pub fn fail_sends(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    /// Deliver an inbound event on the current link of `gateway`
    ///
    /// Returns false when the gateway has no live link.
    pub async fn inject(&self, gateway: &str, event: GroupEvent) -> bool {
        let tx = self.state().links.get(gateway).map(|(_, tx)| tx.clone());
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// End the inbound stream of the current link, as a remote hang-up would
    pub fn hang_up(&self, gateway: &str) {
        self.state().links.remove(gateway);
    }

    pub fn is_connected(&self, gateway: &str) -> bool {
        self.state().links.contains_key(gateway)
    }

    /// Number of successful connects to `gateway`
    pub fn connect_count(&self, gateway: &str) -> usize {
        self.state().connects.get(gateway).copied().unwrap_or(0)
    }

    /// Everything sent so far, with the gateway it went to
    pub fn sent(&self) -> Vec<(String, GroupEvent)> {
        self.state().sent.clone()
    }
}

#[async_trait]
impl BusTransport for MockTransport {
    async fn connect(&self, gateway: &str) -> Result<GatewayLink> {
        let mut state = self.state();
        if state.unreachable.contains(gateway) {
            return Err(KnxError::transport_connect(format!(
                "{gateway}: unreachable"
            )));
        }

        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        state.next_id += 1;
        let id = state.next_id;
        state.links.insert(gateway.to_string(), (id, tx));
        *state.connects.entry(gateway.to_string()).or_default() += 1;

        let handle = MockHandle {
            gateway: gateway.to_string(),
            id,
            state: self.state.clone(),
        };
        Ok(GatewayLink {
            inbound,
            handle: Arc::new(handle),
        })
    }
}

struct MockHandle {
    gateway: String,
    id: u64,
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl GatewayHandle for MockHandle {
    async fn send(&self, event: &GroupEvent) -> Result<()> {
        let mut state = self.state();
        if state.fail_sends {
            return Err(KnxError::transport_send(format!(
                "{}: send refused",
                self.gateway
            )));
        }
        state.sent.push((self.gateway.clone(), event.clone()));
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.state();
        if matches!(state.links.get(&self.gateway), Some((id, _)) if *id == self.id) {
            state.links.remove(&self.gateway);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_link_lifecycle() {
        let transport = MockTransport::new();
        let event = GroupEvent::write("1/2/3".parse().unwrap(), vec![1]);

        transport.set_reachable("gw", false);
        assert!(transport.connect("gw").await.is_err());
        assert!(!transport.inject("gw", event.clone()).await);

        transport.set_reachable("gw", true);
        let mut link = transport.connect("gw").await.unwrap();
        assert_eq!(transport.connect_count("gw"), 1);
        assert!(transport.inject("gw", event.clone()).await);
        assert_eq!(link.inbound.recv().await.unwrap(), event);

        link.handle.send(&event).await.unwrap();
        assert_eq!(transport.sent(), vec![("gw".to_string(), event.clone())]);

        transport.fail_sends(true);
        assert!(link.handle.send(&event).await.is_err());

        transport.hang_up("gw");
        assert!(link.inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stale_close_keeps_new_link() {
        let transport = MockTransport::new();
        let old = transport.connect("gw").await.unwrap();
        let _new = transport.connect("gw").await.unwrap();
        old.handle.close().await;
        assert!(transport.is_connected("gw"));
    }
}
