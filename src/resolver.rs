//! Point catalog and address resolution
//!
//! Names are hierarchical (`myroom/temperature`). A query resolves to the
//! group address it spells literally, to the single point whose name matches
//! exactly, or to every point below it in the name hierarchy.

use crate::address::{GroupAddr, IndividualAddr};
use crate::config::AddressEntry;
use crate::dpt::{self, DatapointValue};
use crate::error::{KnxError, Result};
use crate::storage::ObservedMessage;
use chrono::Local;
use std::collections::BTreeMap;
use tracing::debug;

/// A configured group address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedPoint {
    pub name: String,
    pub dpt: String,
}

/// Read-only name tables built from configuration
#[derive(Debug, Clone, Default)]
pub struct PointCatalog {
    points: BTreeMap<GroupAddr, NamedPoint>,
    devices: BTreeMap<IndividualAddr, String>,
}

impl PointCatalog {
    pub fn new(
        addresses: &BTreeMap<GroupAddr, AddressEntry>,
        devices: &BTreeMap<IndividualAddr, String>,
    ) -> Self {
        let points = addresses
            .iter()
            .map(|(addr, entry)| {
                (
                    *addr,
                    NamedPoint {
                        name: entry.name.clone(),
                        dpt: entry.dpt.clone(),
                    },
                )
            })
            .collect();
        Self {
            points,
            devices: devices.clone(),
        }
    }

    pub fn point(&self, addr: GroupAddr) -> Option<&NamedPoint> {
        self.points.get(&addr)
    }

    pub fn device_name(&self, addr: IndividualAddr) -> Option<&str> {
        self.devices.get(&addr).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Resolve a literal address or a (prefix of a) point name
    ///
    /// Result is ascending and duplicate free. An exact name match wins over
    /// prefix matches.
    pub fn resolve(&self, query: &str) -> Vec<GroupAddr> {
        if let Ok(addr) = query.parse::<GroupAddr>() {
            return vec![addr];
        }

        if let Some(addr) = self.exact(query) {
            return vec![addr];
        }

        let prefix = format!("{query}/");
        self.points
            .iter()
            .filter(|(_, point)| point.name.starts_with(&prefix))
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// Resolve to exactly one address, as required for writes
    pub fn resolve_unique(&self, query: &str) -> Result<GroupAddr> {
        match self.resolve(query).as_slice() {
            [addr] => Ok(*addr),
            matches => Err(KnxError::unresolved(query, matches.len())),
        }
    }

    fn exact(&self, name: &str) -> Option<GroupAddr> {
        self.points
            .iter()
            .find(|(_, point)| point.name == name)
            .map(|(addr, _)| *addr)
    }

    /// Fresh codec for `addr`; opaque when unconfigured or of unknown type
    pub fn codec_for(&self, addr: GroupAddr) -> DatapointValue {
        let tag = self.point(addr).map(|p| p.dpt.as_str());
        dpt::produce_or_opaque(tag).0
    }

    /// Decode the payload of `msg` with the configured type of its destination
    pub fn decode(&self, msg: &ObservedMessage) -> Result<DatapointValue> {
        let mut value = self.codec_for(msg.event.destination);
        value.unpack(&msg.event.data)?;
        Ok(value)
    }

    /// One-line human readable rendering of an observed message
    ///
    /// `2024-03-01 12:00:00 write: 1.1.10 2/5/7=[0 12 51] myroom.thermostat myroom/temperature=21.50 °C`
    pub fn describe(&self, msg: &ObservedMessage) -> String {
        let event = &msg.event;
        let mut line = format!(
            "{} {}: {} {}={}",
            msg.when.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            event.command,
            event.source,
            event.destination,
            dpt::format_bytes(&event.data)
        );
        if let Some(device) = self.device_name(event.source) {
            line.push(' ');
            line.push_str(device);
        }
        if let Some(point) = self.point(event.destination) {
            match self.decode(msg) {
                Ok(value) => {
                    line.push_str(&format!(" {}={value}", point.name));
                }
                Err(e) => {
                    debug!(
                        "cannot decode {} for {}: {e}",
                        dpt::format_bytes(&event.data),
                        event.destination
                    );
                }
            }
        }
        line
    }
}
