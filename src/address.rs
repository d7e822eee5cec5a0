//! KNX addressing and group telegram types
//!
//! Group addresses identify logical points on the bus (`main/middle/sub`),
//! individual addresses identify physical devices (`area.line.device`).
//! Both are serialized as their canonical text form so they can key JSON maps.

use crate::error::{KnxError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 3-level group address, one byte per level, ordered level by level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GroupAddr([u8; 3]);

impl GroupAddr {
    pub const fn new(main: u8, middle: u8, sub: u8) -> Self {
        Self([main, middle, sub])
    }

    pub const fn main(self) -> u8 {
        self.0[0]
    }

    pub const fn middle(self) -> u8 {
        self.0[1]
    }

    pub const fn sub(self) -> u8 {
        self.0[2]
    }
}

impl fmt::Display for GroupAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.main(), self.middle(), self.sub())
    }
}

impl FromStr for GroupAddr {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let levels = parse_levels(s, '/')
            .ok_or_else(|| KnxError::parse(format!("invalid group address {s:?}")))?;
        Ok(GroupAddr::new(levels[0], levels[1], levels[2]))
    }
}

/// Physical device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct IndividualAddr(u16);

impl IndividualAddr {
    /// Build from area (4 bits), line (4 bits) and device (8 bits)
    pub fn new(area: u8, line: u8, device: u8) -> Result<Self> {
        if area > 15 || line > 15 {
            return Err(KnxError::parse(format!(
                "individual address {area}.{line}.{device} out of range"
            )));
        }
        Ok(Self(
            (u16::from(area) << 12) | (u16::from(line) << 8) | u16::from(device),
        ))
    }

}

impl fmt::Display for IndividualAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            (self.0 >> 12) & 0x0f,
            (self.0 >> 8) & 0x0f,
            self.0 & 0xff
        )
    }
}

impl FromStr for IndividualAddr {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let levels = parse_levels(s, '.')
            .ok_or_else(|| KnxError::parse(format!("invalid individual address {s:?}")))?;
        IndividualAddr::new(levels[0], levels[1], levels[2])
    }
}

fn parse_levels(s: &str, sep: char) -> Option<[u8; 3]> {
    let mut parts = s.split(sep);
    let mut levels = [0u8; 3];
    for level in levels.iter_mut() {
        *level = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(levels)
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(GroupAddr);
string_serde!(IndividualAddr);

/// Group telegram service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupCommand {
    Read,
    Response,
    Write,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for GroupCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupCommand::Read => "read",
            GroupCommand::Response => "response",
            GroupCommand::Write => "write",
            GroupCommand::Unknown => "???",
        };
        f.write_str(name)
    }
}

/// A group telegram as exchanged with a gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEvent {
    pub command: GroupCommand,
    #[serde(default)]
    pub source: IndividualAddr,
    pub destination: GroupAddr,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl GroupEvent {
    /// Outbound write originating from this bridge
    pub fn write(destination: GroupAddr, data: Vec<u8>) -> Self {
        Self {
            command: GroupCommand::Write,
            source: IndividualAddr::default(),
            destination,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_addr_parse_and_display() {
        let addr: GroupAddr = "2/5/7".parse().unwrap();
        assert_eq!(addr.main(), 2);
        assert_eq!(addr.middle(), 5);
        assert_eq!(addr.sub(), 7);
        assert_eq!(addr.to_string(), "2/5/7");
    }

    #[test]
    fn test_group_addr_accepts_any_byte_levels() {
        for text in ["9/9/9", "31/7/255", "255/255/255", "0/0/0"] {
            let addr: GroupAddr = text.parse().unwrap();
            assert_eq!(addr.to_string(), text);
        }
    }

    #[test]
    fn test_group_addr_rejects_invalid() {
        assert!("256/0/0".parse::<GroupAddr>().is_err());
        assert!("1/2/256".parse::<GroupAddr>().is_err());
        assert!("1//3".parse::<GroupAddr>().is_err());
        assert!("1/2".parse::<GroupAddr>().is_err());
        assert!("1/2/3/4".parse::<GroupAddr>().is_err());
        assert!("myroom/temp".parse::<GroupAddr>().is_err());
    }

    #[test]
    fn test_group_addr_ordering_is_level_by_level() {
        let mut addrs: Vec<GroupAddr> = ["2/0/0", "1/9/0", "1/7/255", "1/0/3", "0/0/1"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        addrs.sort();
        let rendered: Vec<String> = addrs.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["0/0/1", "1/0/3", "1/7/255", "1/9/0", "2/0/0"]);
    }

    #[test]
    fn test_individual_addr_round_trip() {
        let addr: IndividualAddr = "1.1.10".parse().unwrap();
        assert_eq!(addr.to_string(), "1.1.10");
        assert!("16.0.1".parse::<IndividualAddr>().is_err());
    }

    #[test]
    fn test_event_json_shape() {
        let event = GroupEvent {
            command: GroupCommand::Write,
            source: "1.1.10".parse().unwrap(),
            destination: "2/5/7".parse().unwrap(),
            data: vec![0, 12, 34],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["command"], "write");
        assert_eq!(json["source"], "1.1.10");
        assert_eq!(json["destination"], "2/5/7");

        let parsed: GroupEvent =
            serde_json::from_str(r#"{"command":"bogus","destination":"1/2/3"}"#).unwrap();
        assert_eq!(parsed.command, GroupCommand::Unknown);
        assert!(parsed.data.is_empty());
    }
}
