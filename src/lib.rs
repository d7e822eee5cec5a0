//! KNX gateway bridge
//!
//! Keeps the last known value of every group address observed across one or
//! more redundant KNX gateways and exposes it, by name, over HTTP.
//!
//! # Features
//!
//! - Independent supervision of every gateway with stall detection and reconnect
//! - Latest value per address, full history and an ordered address index
//! - Datapoint codecs for the common DPT families (switches, percentages,
//!   counters, 2-octet and 4-octet floats, scenes)
//! - Hierarchical point names (`myroom/temperature`) for queries and writes
//! - Periodic JSON snapshots of the latest values

// Core modules
pub mod address;
pub mod bridge;
pub mod client;
pub mod config;
pub mod dpt;
pub mod error;
pub mod http_transport;
pub mod logging;
pub mod resolver;
pub mod storage;
pub mod supervisor;

// Test support modules - available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

// Re-export main types for convenience
pub use bridge::KnxBridge;
pub use config::ServerConfig;
pub use error::{KnxError, Result};
pub use resolver::PointCatalog;
pub use storage::StateStore;
pub use supervisor::GatewaySupervisor;
