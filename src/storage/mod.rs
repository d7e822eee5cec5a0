//! State storage for observed bus traffic
//!
//! This module provides:
//! - The in-memory state store (latest value per address, history, index)
//! - The live gateway registry used for outbound dispatch
//! - JSON snapshot persistence of the latest values

pub mod snapshot;
pub mod state_store;

use crate::address::GroupEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use snapshot::{load_snapshot, restore_snapshot, save_snapshot, spawn_snapshot_task};
pub use state_store::{LinkState, StateStore};

/// A group event as it arrived (or was synthesized), stamped with time and gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedMessage {
    pub when: DateTime<Utc>,
    pub gateway: String,
    pub event: GroupEvent,
}

impl ObservedMessage {
    pub fn now(gateway: &str, event: GroupEvent) -> Self {
        Self {
            when: Utc::now(),
            gateway: gateway.to_string(),
            event,
        }
    }
}
