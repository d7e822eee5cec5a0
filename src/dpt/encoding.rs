//! Wire encodings for datapoint payloads
//!
//! Payloads follow the group telegram layout: 1-bit values are carried in the
//! single APCI byte, everything wider is preceded by one zero byte.

use crate::error::{KnxError, Result};

/// How a datapoint type lays out its value on the wire
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Encoding {
    /// 1 bit boolean
    B1,
    /// 8 bit unsigned
    U8,
    /// 8 bit unsigned mapped linearly onto `0..=max`
    ScaledU8 { max: f64 },
    /// 8 bit two's complement
    V8,
    /// 16 bit unsigned
    U16,
    /// 16 bit two's complement
    V16,
    /// 32 bit unsigned
    U32,
    /// 32 bit two's complement
    V32,
    /// KNX 2-octet float (DPT 9)
    F16,
    /// IEEE 754 single precision
    F32,
    /// 6 bit scene number
    Scene,
}

/// Value kind a decoded payload produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Bool,
    Int,
    Unsigned,
    Float,
}

impl Encoding {
    pub fn kind(self) -> Kind {
        match self {
            Encoding::B1 => Kind::Bool,
            Encoding::U8 | Encoding::U16 | Encoding::U32 | Encoding::Scene => Kind::Unsigned,
            Encoding::V8 | Encoding::V16 | Encoding::V32 => Kind::Int,
            Encoding::ScaledU8 { .. } | Encoding::F16 | Encoding::F32 => Kind::Float,
        }
    }

    /// Payload length including the leading APCI byte
    pub fn payload_len(self) -> usize {
        match self {
            Encoding::B1 => 1,
            Encoding::U8 | Encoding::ScaledU8 { .. } | Encoding::V8 | Encoding::Scene => 2,
            Encoding::U16 | Encoding::V16 | Encoding::F16 => 3,
            Encoding::U32 | Encoding::V32 | Encoding::F32 => 5,
        }
    }

    /// Encode an already range-clamped number
    pub fn pack(self, x: f64) -> Vec<u8> {
        match self {
            Encoding::B1 => vec![u8::from(x != 0.0)],
            Encoding::U8 => vec![0, x as u8],
            Encoding::ScaledU8 { max } => vec![0, (x * 255.0 / max).round() as u8],
            Encoding::V8 => vec![0, (x as i8) as u8],
            Encoding::Scene => vec![0, (x as u8) & 0x3f],
            Encoding::U16 => with_apci(&(x as u16).to_be_bytes()),
            Encoding::V16 => with_apci(&(x as i16).to_be_bytes()),
            Encoding::U32 => with_apci(&(x as u32).to_be_bytes()),
            Encoding::V32 => with_apci(&(x as i32).to_be_bytes()),
            Encoding::F16 => pack_f16(x),
            Encoding::F32 => with_apci(&(x as f32).to_be_bytes()),
        }
    }

    /// Decode a payload into a number of this encoding's kind
    pub fn unpack(self, data: &[u8]) -> Result<f64> {
        if data.len() != self.payload_len() {
            return Err(KnxError::parse(format!(
                "invalid payload length {} (expected {})",
                data.len(),
                self.payload_len()
            )));
        }
        let value = match self {
            Encoding::B1 => f64::from(data[0] & 0x01),
            Encoding::U8 => f64::from(data[1]),
            Encoding::ScaledU8 { max } => f64::from(data[1]) * max / 255.0,
            Encoding::V8 => f64::from(data[1] as i8),
            Encoding::Scene => f64::from(data[1] & 0x3f),
            Encoding::U16 => f64::from(u16::from_be_bytes([data[1], data[2]])),
            Encoding::V16 => f64::from(i16::from_be_bytes([data[1], data[2]])),
            Encoding::U32 => f64::from(u32::from_be_bytes([data[1], data[2], data[3], data[4]])),
            Encoding::V32 => f64::from(i32::from_be_bytes([data[1], data[2], data[3], data[4]])),
            Encoding::F16 => unpack_f16(data[1], data[2]),
            Encoding::F32 => f64::from(f32::from_be_bytes([data[1], data[2], data[3], data[4]])),
        };
        Ok(value)
    }
}

fn with_apci(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(0);
    out.extend_from_slice(bytes);
    out
}

// value = 0.01 * M * 2^E, M is 12 bit two's complement, E is 4 bit
fn pack_f16(x: f64) -> Vec<u8> {
    let x = x.clamp(-671_088.64, 670_760.96);
    let mut mantissa = (x * 100.0).round() as i32;
    let mut exponent = 0u8;
    while !(-2048..=2047).contains(&mantissa) {
        mantissa /= 2;
        exponent += 1;
    }

    let mut high = (exponent & 0x0f) << 3;
    if mantissa < 0 {
        mantissa += 2048;
        high |= 0x80;
    }
    let mantissa = mantissa as u16;
    high |= ((mantissa >> 8) & 0x07) as u8;
    vec![0, high, (mantissa & 0xff) as u8]
}

fn unpack_f16(high: u8, low: u8) -> f64 {
    let mut mantissa = (i32::from(high & 0x07) << 8) | i32::from(low);
    if high & 0x80 != 0 {
        mantissa -= 2048;
    }
    let exponent = (high >> 3) & 0x0f;
    0.01 * f64::from(mantissa) * f64::from(1u32 << exponent)
}
