//! Query and command service
//!
//! [`KnxBridge`] combines the point catalog, the state store and the gateway
//! supervisor behind the operations the HTTP surface exposes.

use crate::address::{GroupAddr, GroupCommand, GroupEvent, IndividualAddr};
use crate::dpt::DatapointValue;
use crate::error::{KnxError, Result};
use crate::resolver::PointCatalog;
use crate::storage::{LinkState, ObservedMessage, StateStore};
use crate::supervisor::GatewaySupervisor;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// An observed message as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    /// Local time, `YYYY-MM-DD hh:mm:ss`
    pub time: String,
    pub timestamp: DateTime<Utc>,
    pub gateway: String,
    pub command: GroupCommand,
    pub source: IndividualAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub destination: GroupAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub data: Vec<u8>,
    /// Decoded value with unit, when the destination has a usable type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// One-line rendering as written to the traffic log
    pub text: String,
}

impl MessageView {
    pub fn new(catalog: &PointCatalog, msg: &ObservedMessage) -> Self {
        let event = &msg.event;
        let point = catalog.point(event.destination);
        let value = point
            .and_then(|_| catalog.decode(msg).ok())
            .filter(|value| !value.is_opaque())
            .map(|value| value.to_string());
        Self {
            time: msg
                .when
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            timestamp: msg.when,
            gateway: msg.gateway.clone(),
            command: event.command,
            source: event.source,
            device: catalog.device_name(event.source).map(str::to_string),
            destination: event.destination,
            name: point.map(|p| p.name.clone()),
            data: event.data.clone(),
            value,
            text: catalog.describe(msg),
        }
    }
}

/// Latest value of one address decoded through its codec
#[derive(Debug, Clone, Serialize)]
pub struct DecodedValue {
    pub destination: GroupAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<DatapointValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a successful write
#[derive(Debug, Clone, Serialize)]
pub struct WriteReceipt {
    pub destination: GroupAddr,
    pub name: Option<String>,
    pub gateway: String,
    /// Value as sent, after normalization
    pub value: DatapointValue,
    pub data: Vec<u8>,
    pub message: MessageView,
}

/// Link state of one gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayStatus {
    pub gateway: String,
    pub state: LinkState,
}

/// The bridge service shared by all request handlers
pub struct KnxBridge {
    catalog: Arc<PointCatalog>,
    store: Arc<StateStore>,
    supervisor: Arc<GatewaySupervisor>,
}

impl KnxBridge {
    pub fn new(supervisor: Arc<GatewaySupervisor>) -> Self {
        let store = supervisor.store().clone();
        Self {
            catalog: store.catalog().clone(),
            store,
            supervisor,
        }
    }

    pub fn catalog(&self) -> &PointCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    fn view(&self, msg: &ObservedMessage) -> MessageView {
        MessageView::new(&self.catalog, msg)
    }

    fn resolve(&self, query: &str) -> Result<Vec<GroupAddr>> {
        let addrs = self.catalog.resolve(query);
        if addrs.is_empty() {
            return Err(KnxError::unresolved(query, 0));
        }
        Ok(addrs)
    }

    /// Most recent message overall
    pub async fn latest(&self) -> Option<MessageView> {
        self.store.latest().await.map(|msg| self.view(&msg))
    }

    /// Latest message of every known address, ascending
    pub async fn all(&self) -> Vec<MessageView> {
        self.store
            .all_latest()
            .await
            .iter()
            .map(|msg| self.view(msg))
            .collect()
    }

    /// Every recorded message for the addresses `query` resolves to
    pub async fn history_for(&self, query: &str) -> Result<Vec<MessageView>> {
        let addrs = self.resolve(query)?;
        let history = self.store.history_for(&addrs).await;
        Ok(history.iter().map(|msg| self.view(msg)).collect())
    }

    /// Latest message for each observed address `query` resolves to
    pub async fn latest_for(&self, query: &str) -> Result<Vec<MessageView>> {
        let addrs = self.resolve(query)?;
        let latest = self.store.latest_for(&addrs).await;
        Ok(latest.iter().map(|msg| self.view(msg)).collect())
    }

    /// Latest values decoded with their configured types (opaque otherwise)
    pub async fn decoded_for(&self, query: &str) -> Result<Vec<DecodedValue>> {
        let addrs = self.resolve(query)?;
        let latest = self.store.latest_for(&addrs).await;
        Ok(latest
            .iter()
            .map(|msg| {
                let destination = msg.event.destination;
                let name = self.catalog.point(destination).map(|p| p.name.clone());
                match self.catalog.decode(msg) {
                    Ok(value) => DecodedValue {
                        destination,
                        name,
                        value: Some(value),
                        error: None,
                    },
                    Err(e) => DecodedValue {
                        destination,
                        name,
                        value: None,
                        error: Some(format!(
                            "cannot decode {} for {destination}: {e}",
                            crate::dpt::format_bytes(&msg.event.data)
                        )),
                    },
                }
            })
            .collect())
    }

    /// Write `value_text` to the single address `query` names
    ///
    /// The event goes to the gateway that last delivered traffic for the
    /// address and is ingested locally once sent.
    pub async fn write(&self, query: &str, value_text: &str) -> Result<WriteReceipt> {
        let destination = self.catalog.resolve_unique(query)?;

        let last = self
            .store
            .latest_of(destination)
            .await
            .ok_or_else(|| KnxError::no_prior_traffic(destination.to_string()))?;

        let mut value = self.catalog.codec_for(destination);
        if value.is_opaque() {
            return Err(KnxError::unsupported_write(format!(
                "{destination} has no known datapoint type"
            )));
        }
        value.set_from_text(value_text)?;

        let data = value.pack();
        let event = GroupEvent::write(destination, data.clone());
        self.supervisor.send(&last.gateway, &event).await?;
        info!("Wrote {value} to {destination} via {}", last.gateway);

        let msg = self.store.ingest(&last.gateway, event).await;
        Ok(WriteReceipt {
            destination,
            name: self.catalog.point(destination).map(|p| p.name.clone()),
            gateway: last.gateway,
            value,
            data,
            message: self.view(&msg),
        })
    }

    /// Link state of every supervised gateway
    pub async fn gateway_status(&self) -> Vec<GatewayStatus> {
        self.store
            .link_states()
            .await
            .into_iter()
            .map(|(gateway, state)| GatewayStatus { gateway, state })
            .collect()
    }
}
