//! Datapoint type registry and typed values
//!
//! A datapoint type (DPT) tag such as `9.001` selects how a group payload is
//! interpreted. [`produce`] maps a tag to a zero-initialised [`DatapointValue`];
//! unknown tags fall back to an opaque value that keeps the raw bytes, so every
//! address stays displayable even without type metadata.
//!
//! Every mutation goes through `pack` and `unpack` again so the in-memory value
//! always matches what the bus would carry (range clamping, scaling, float
//! precision).

pub mod encoding;

use crate::error::{KnxError, Result};
use encoding::{Encoding, Kind};
use serde::Serialize;
use std::fmt;

/// Static description of a registered datapoint type
#[derive(Debug, PartialEq)]
pub struct DatapointType {
    pub tag: &'static str,
    pub name: &'static str,
    pub unit: &'static str,
    pub encoding: Encoding,
    pub min: f64,
    pub max: f64,
    /// Display labels for `false` / `true` of boolean types
    pub labels: Option<[&'static str; 2]>,
}

impl DatapointType {
    pub fn kind(&self) -> Kind {
        self.encoding.kind()
    }

    fn clamp(&self, x: f64) -> f64 {
        x.clamp(self.min, self.max)
    }
}

macro_rules! dpt {
    ($tag:literal, $name:literal, $unit:literal, $enc:expr, $min:expr, $max:expr) => {
        DatapointType {
            tag: $tag,
            name: $name,
            unit: $unit,
            encoding: $enc,
            min: $min,
            max: $max,
            labels: None,
        }
    };
    ($tag:literal, $name:literal, [$off:literal, $on:literal]) => {
        DatapointType {
            tag: $tag,
            name: $name,
            unit: "",
            encoding: Encoding::B1,
            min: 0.0,
            max: 1.0,
            labels: Some([$off, $on]),
        }
    };
}

const U8_MAX: f64 = u8::MAX as f64;
const U16_MAX: f64 = u16::MAX as f64;
const U32_MAX: f64 = u32::MAX as f64;
const F16_MAX: f64 = 670_760.96;
const F32_MAX: f64 = f32::MAX as f64;

static REGISTRY: &[DatapointType] = &[
    dpt!("1.001", "switch", ["Off", "On"]),
    dpt!("1.002", "bool", ["False", "True"]),
    dpt!("1.003", "enable", ["Disable", "Enable"]),
    dpt!("1.008", "up_down", ["Up", "Down"]),
    dpt!("1.009", "open_close", ["Open", "Close"]),
    dpt!("1.010", "start", ["Stop", "Start"]),
    dpt!("1.011", "state", ["Inactive", "Active"]),
    dpt!("1.019", "window_door", ["Closed", "Open"]),
    dpt!("5.001", "scaling", "%", Encoding::ScaledU8 { max: 100.0 }, 0.0, 100.0),
    dpt!("5.003", "angle", "°", Encoding::ScaledU8 { max: 360.0 }, 0.0, 360.0),
    dpt!("5.004", "percent_u8", "%", Encoding::U8, 0.0, U8_MAX),
    dpt!("5.010", "counter_pulses", "", Encoding::U8, 0.0, U8_MAX),
    dpt!("6.001", "percent_v8", "%", Encoding::V8, -128.0, 127.0),
    dpt!("6.010", "counter_pulses", "", Encoding::V8, -128.0, 127.0),
    dpt!("7.001", "pulses", "", Encoding::U16, 0.0, U16_MAX),
    dpt!("7.013", "brightness", "lux", Encoding::U16, 0.0, U16_MAX),
    dpt!("8.001", "pulses_difference", "", Encoding::V16, -32768.0, 32767.0),
    dpt!("9.001", "temperature", "°C", Encoding::F16, -273.0, F16_MAX),
    dpt!("9.002", "temperature_difference", "K", Encoding::F16, -F16_MAX, F16_MAX),
    dpt!("9.004", "illuminance", "lux", Encoding::F16, 0.0, F16_MAX),
    dpt!("9.005", "wind_speed", "m/s", Encoding::F16, 0.0, F16_MAX),
    dpt!("9.007", "humidity", "%", Encoding::F16, 0.0, F16_MAX),
    dpt!("9.008", "air_quality", "ppm", Encoding::F16, 0.0, F16_MAX),
    dpt!("12.001", "counter_pulses", "", Encoding::U32, 0.0, U32_MAX),
    dpt!("13.001", "counter_pulses", "", Encoding::V32, i32::MIN as f64, i32::MAX as f64),
    dpt!("13.010", "active_energy", "Wh", Encoding::V32, i32::MIN as f64, i32::MAX as f64),
    dpt!("14.019", "electric_current", "A", Encoding::F32, -F32_MAX, F32_MAX),
    dpt!("14.056", "power", "W", Encoding::F32, -F32_MAX, F32_MAX),
    dpt!("14.068", "temperature", "°C", Encoding::F32, -F32_MAX, F32_MAX),
    dpt!("17.001", "scene_number", "", Encoding::Scene, 0.0, 63.0),
];

/// Look up a registered datapoint type
pub fn lookup(tag: &str) -> Option<&'static DatapointType> {
    REGISTRY.iter().find(|dpt| dpt.tag == tag)
}

/// All registered datapoint types, in registry order
pub fn registered_types() -> impl Iterator<Item = &'static DatapointType> {
    REGISTRY.iter()
}

/// Create a zero value for `tag`, or `None` if the tag is not registered
pub fn produce(tag: &str) -> Option<DatapointValue> {
    lookup(tag).map(DatapointValue::zero)
}

/// Like [`produce`], falling back to an opaque value; the flag reports whether
/// the tag was found
pub fn produce_or_opaque(tag: Option<&str>) -> (DatapointValue, bool) {
    match tag.and_then(produce) {
        Some(value) => (value, true),
        None => (DatapointValue::opaque(Vec::new()), false),
    }
}

/// Create a value of type `tag` holding `x` (after normalization)
pub fn new_from_number(tag: &str, x: f64) -> Result<DatapointValue> {
    let mut value = produce(tag).ok_or_else(|| KnxError::unknown_type(tag))?;
    value.set_number(x)?;
    Ok(value)
}

pub fn get_as_text(value: &DatapointValue) -> String {
    value.as_text()
}

pub fn get_as_number(value: &DatapointValue) -> Result<f64> {
    value.as_number()
}

pub fn set_from_number(value: &mut DatapointValue, x: f64) -> Result<()> {
    value.set_number(x)
}

pub fn set_from_text(value: &mut DatapointValue, text: &str) -> Result<()> {
    value.set_from_text(text)
}

/// Underlying value of a datapoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Unsigned(u64),
    Float(f64),
    Opaque(Vec<u8>),
}

/// A value bound to its datapoint type; opaque values have no type
#[derive(Debug, Clone, PartialEq)]
pub struct DatapointValue {
    dpt: Option<&'static DatapointType>,
    value: Value,
}

impl DatapointValue {
    fn zero(dpt: &'static DatapointType) -> Self {
        let value = match dpt.kind() {
            Kind::Bool => Value::Bool(false),
            Kind::Int => Value::Int(0),
            Kind::Unsigned => Value::Unsigned(0),
            Kind::Float => Value::Float(0.0),
        };
        Self {
            dpt: Some(dpt),
            value,
        }
    }

    /// Untyped value carrying raw payload bytes unchanged
    pub fn opaque(data: Vec<u8>) -> Self {
        Self {
            dpt: None,
            value: Value::Opaque(data),
        }
    }

    pub fn dpt(&self) -> Option<&'static DatapointType> {
        self.dpt
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_opaque(&self) -> bool {
        self.dpt.is_none()
    }

    /// Encode into a group payload
    pub fn pack(&self) -> Vec<u8> {
        match (self.dpt, &self.value) {
            (Some(dpt), value) => dpt.encoding.pack(dpt.clamp(number_of(value))),
            (None, Value::Opaque(data)) => data.clone(),
            (None, _) => Vec::new(),
        }
    }

    /// Decode a group payload into this value
    pub fn unpack(&mut self, data: &[u8]) -> Result<()> {
        let Some(dpt) = self.dpt else {
            self.value = Value::Opaque(data.to_vec());
            return Ok(());
        };
        let x = dpt
            .encoding
            .unpack(data)
            .map_err(|e| KnxError::parse(format!("DPT {}: {e}", dpt.tag)))?;
        self.value = match dpt.kind() {
            Kind::Bool => Value::Bool(x != 0.0),
            Kind::Int => Value::Int(x as i64),
            Kind::Unsigned => Value::Unsigned(x as u64),
            Kind::Float => Value::Float(x),
        };
        Ok(())
    }

    /// Collapse the value onto its canonical packed form
    pub fn normalize(&mut self) -> Result<()> {
        let packed = self.pack();
        self.unpack(&packed)
    }

    /// Numeric view of bool, integer and float values
    pub fn as_number(&self) -> Result<f64> {
        match &self.value {
            Value::Opaque(_) => Err(KnxError::unsupported_kind(
                "opaque payload has no numeric value",
            )),
            value => Ok(number_of(value)),
        }
    }

    /// Set from a number, then normalize
    pub fn set_number(&mut self, x: f64) -> Result<()> {
        let Some(dpt) = self.dpt else {
            return Err(KnxError::unsupported_kind("cannot set an opaque payload"));
        };
        if x.is_nan() {
            return Err(KnxError::parse("NaN is not a datapoint value"));
        }
        let x = dpt.clamp(x);
        self.value = match dpt.kind() {
            Kind::Bool => Value::Bool(x != 0.0),
            Kind::Int => Value::Int(x as i64),
            Kind::Unsigned => Value::Unsigned(x as u64),
            Kind::Float => Value::Float(x),
        };
        self.normalize()
    }

    /// Set from text according to the value kind, then normalize
    pub fn set_from_text(&mut self, text: &str) -> Result<()> {
        let Some(dpt) = self.dpt else {
            return Err(KnxError::unsupported_kind("cannot set an opaque payload"));
        };
        let text = text.trim();
        let malformed = || KnxError::parse(format!("invalid value {text:?} for DPT {}", dpt.tag));
        self.value = match dpt.kind() {
            Kind::Bool => Value::Bool(parse_bool(text).ok_or_else(malformed)?),
            Kind::Int => Value::Int(text.parse().map_err(|_| malformed())?),
            Kind::Unsigned => Value::Unsigned(text.parse().map_err(|_| malformed())?),
            Kind::Float => {
                let x: f64 = text.parse().map_err(|_| malformed())?;
                if !x.is_finite() {
                    return Err(malformed());
                }
                Value::Float(x)
            }
        };
        self.normalize()
    }

    /// Plain text rendering without unit
    pub fn as_text(&self) -> String {
        match &self.value {
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Unsigned(u) => u.to_string(),
            Value::Float(f) => format!("{f:.6}"),
            Value::Opaque(_) => format_bytes(&self.pack()),
        }
    }
}

impl fmt::Display for DatapointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(dpt) = self.dpt else {
            return f.write_str(&self.as_text());
        };
        match (&self.value, dpt.labels) {
            (Value::Bool(b), Some(labels)) => return f.write_str(labels[usize::from(*b)]),
            (Value::Float(x), _) => write!(f, "{x:.2}")?,
            _ => f.write_str(&self.as_text())?,
        }
        if !dpt.unit.is_empty() {
            write!(f, " {}", dpt.unit)?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct DatapointView<'a> {
    #[serde(rename = "type")]
    tag: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'static str>,
    value: &'a Value,
    #[serde(skip_serializing_if = "str::is_empty")]
    unit: &'static str,
    text: String,
}

impl Serialize for DatapointValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        DatapointView {
            tag: self.dpt.map(|d| d.tag),
            name: self.dpt.map(|d| d.name),
            value: &self.value,
            unit: self.dpt.map(|d| d.unit).unwrap_or(""),
            text: self.to_string(),
        }
        .serialize(serializer)
    }
}

fn number_of(value: &Value) -> f64 {
    match value {
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Int(i) => *i as f64,
        Value::Unsigned(u) => *u as f64,
        Value::Float(f) => *f,
        Value::Opaque(_) => 0.0,
    }
}

/// Boolean literals accepted on the command surface
fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Render bytes as a space separated list, e.g. `[0 12 51]`
pub fn format_bytes(data: &[u8]) -> String {
    let items: Vec<String> = data.iter().map(u8::to_string).collect();
    format!("[{}]", items.join(" "))
}
