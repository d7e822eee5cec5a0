//! Bus transport seam
//!
//! A [`BusTransport`] opens links to gateways. Each [`GatewayLink`] yields a
//! stream of inbound group events and a shareable [`GatewayHandle`] for
//! outbound sends. The stream ending means the link is gone.

pub mod websocket_client;

use crate::address::GroupEvent;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use websocket_client::WebSocketTransport;

/// Capacity of the inbound event channel of one link
pub const INBOUND_CAPACITY: usize = 256;

/// Opens gateway links
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Connect to `gateway` (`host:port`)
    async fn connect(&self, gateway: &str) -> Result<GatewayLink>;
}

/// Outbound side of a live gateway link
#[async_trait]
pub trait GatewayHandle: Send + Sync {
    /// Hand one event to the gateway
    async fn send(&self, event: &GroupEvent) -> Result<()>;

    /// Tear the link down; the inbound stream ends afterwards
    async fn close(&self);
}

/// A live link to one gateway
pub struct GatewayLink {
    pub inbound: mpsc::Receiver<GroupEvent>,
    pub handle: Arc<dyn GatewayHandle>,
}
