//! Common test utilities
//!
//! Builds a complete bridge (catalog, store, supervisor) on top of the mock
//! transport, with short timeouts so reconnect behaviour is observable.

#![allow(dead_code)]

use knxweb_rust::address::{GroupAddr, GroupCommand, GroupEvent};
use knxweb_rust::config::Config;
use knxweb_rust::mock::MockTransport;
use knxweb_rust::{GatewaySupervisor, KnxBridge, PointCatalog, StateStore};
use rstest::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const GW_A: &str = "10.0.0.1:3671";
pub const GW_B: &str = "10.0.0.2:3671";

pub const SAMPLE_CONFIG: &str = "\
port 8001
gateway 10.0.0.1
gateway 10.0.0.2
device 1.1.10 myroom.thermostat
address 2/5/7 9.001 myroom/temp
address 2/5/8 1.019 myroom/door
address 3/0/1 5.001 hall/dimmer
address 3/0/2 99.999 hall/odd
";

#[fixture]
pub fn catalog() -> Arc<PointCatalog> {
    let config = Config::parse(SAMPLE_CONFIG, "test.cfg").unwrap();
    Arc::new(PointCatalog::new(&config.addresses, &config.devices))
}

pub fn ga(s: &str) -> GroupAddr {
    s.parse().unwrap()
}

/// Inbound write telegram from the thermostat
pub fn write_event(dest: &str, data: Vec<u8>) -> GroupEvent {
    GroupEvent {
        command: GroupCommand::Write,
        source: "1.1.10".parse().unwrap(),
        destination: ga(dest),
        data,
    }
}

/// A running bridge over mock gateways
pub struct TestBridge {
    pub transport: MockTransport,
    pub supervisor: Arc<GatewaySupervisor>,
    pub bridge: Arc<KnxBridge>,
    pub cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TestBridge {
    /// Start supervising `gateways`; `unreachable` ones fail every connect
    pub fn start(gateways: &[&str], unreachable: &[&str], idle_timeout: Duration) -> Self {
        let transport = MockTransport::new();
        for gateway in unreachable {
            transport.set_reachable(gateway, false);
        }
        let store = Arc::new(StateStore::new(catalog()));
        let supervisor = Arc::new(
            GatewaySupervisor::new(store, Arc::new(transport.clone()), idle_timeout)
                .with_cooldown(Duration::from_millis(10)),
        );
        let cancel = CancellationToken::new();
        let names: Vec<String> = gateways.iter().map(|g| g.to_string()).collect();
        let tasks = supervisor.spawn_all(&names, &cancel);
        let bridge = Arc::new(KnxBridge::new(supervisor.clone()));
        Self {
            transport,
            supervisor,
            bridge,
            cancel,
            tasks,
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        self.supervisor.store()
    }

    /// Wait until `gateway` has a live link registered with the supervisor
    pub async fn connected(&self, gateway: &str) {
        let store = self.store().clone();
        let gateway = gateway.to_string();
        eventually(|| {
            let store = store.clone();
            let gateway = gateway.clone();
            async move {
                store.link_states().await.get(&gateway)
                    == Some(&knxweb_rust::storage::LinkState::Connected)
            }
        })
        .await;
    }

    /// Inject an inbound event and wait until it has been ingested
    pub async fn receive(&self, gateway: &str, event: GroupEvent) {
        let before = self.store().history_len().await;
        assert!(
            self.transport.inject(gateway, event).await,
            "{gateway} has no live link"
        );
        let store = self.store().clone();
        eventually(|| {
            let store = store.clone();
            async move { store.history_len().await > before }
        })
        .await;
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            task.await.unwrap();
        }
    }
}

/// Poll `check` until it holds, failing the test after two seconds
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met within 2s");
}
