//! Typed field values and their order-preserving index key encoding.
//!
//! Every indexed field is turned into a byte string such that comparing the
//! bytes gives the same result as comparing the [`Value`]s. Scans over an
//! index therefore visit records in exactly the order an in-memory sort on
//! the same field would produce.

use core::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value as JsonValue;
use strum_macros::{Display, IntoStaticStr};
use web3::types::U256;

/// Static type of a record field.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, IntoStaticStr)]
pub enum ValueKind {
    Bool,
    Uint,
    Text,
    Timestamp,
}

/// A single field value. Values of the same kind are totally ordered.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Value {
    Bool(bool),
    Uint(U256),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Uint(_) => ValueKind::Uint,
            Self::Text(_) => ValueKind::Text,
            Self::Timestamp(_) => ValueKind::Timestamp,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Append the order-preserving encoding of this value to `out`.
    ///
    /// Fixed width for everything but text. Text is escaped (`0x00` becomes
    /// `0x00 0xff`) and terminated with `0x00 0x01`, so encodings can be
    /// concatenated for compound keys without breaking the ordering.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Bool(value) => out.push(u8::from(*value)),
            Self::Uint(value) => {
                let mut bytes = [0_u8; 32];
                value.to_big_endian(&mut bytes);
                out.extend_from_slice(&bytes);
            }
            Self::Text(value) => {
                for &byte in value.as_bytes() {
                    if byte == 0 {
                        out.extend_from_slice(&[0x00, 0xff]);
                    } else {
                        out.push(byte);
                    }
                }
                out.extend_from_slice(&[0x00, 0x01]);
            }
            Self::Timestamp(value) => {
                // Flip the sign bit so negative seconds sort first.
                #[allow(clippy::cast_sign_loss)]
                let seconds = (value.timestamp() as u64) ^ (1 << 63);
                out.extend_from_slice(&seconds.to_be_bytes());
                out.extend_from_slice(&value.timestamp_subsec_nanos().to_be_bytes());
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Interpret a JSON value as a value of the given kind.
    ///
    /// Numbers may be given as JSON numbers, decimal strings or `0x` hex
    /// strings; booleans also accept `0` and `1`; timestamps accept RFC 3339
    /// strings or unix seconds.
    pub fn from_json(kind: ValueKind, json: &JsonValue) -> Option<Self> {
        match (kind, json) {
            (ValueKind::Bool, JsonValue::Bool(value)) => Some(Self::Bool(*value)),
            (ValueKind::Bool, JsonValue::Number(number)) => {
                match number.as_u64() {
                    Some(0) => Some(Self::Bool(false)),
                    Some(1) => Some(Self::Bool(true)),
                    _ => None,
                }
            }
            (ValueKind::Uint, JsonValue::Number(number)) => {
                number.as_u64().map(|value| Self::Uint(value.into()))
            }
            (ValueKind::Uint, JsonValue::String(string)) => {
                let parsed = match string.strip_prefix("0x") {
                    Some(hex) => U256::from_str_radix(hex, 16).ok(),
                    None => U256::from_dec_str(string).ok(),
                };
                parsed.map(Self::Uint)
            }
            (ValueKind::Text, JsonValue::String(string)) => Some(Self::Text(string.clone())),
            (ValueKind::Timestamp, JsonValue::String(string)) => {
                DateTime::parse_from_rfc3339(string)
                    .ok()
                    .map(|time| Self::Timestamp(time.with_timezone(&Utc)))
            }
            (ValueKind::Timestamp, JsonValue::Number(number)) => {
                number
                    .as_i64()
                    .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single())
                    .map(Self::Timestamp)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(fmt, "{}", value),
            Self::Uint(value) => write!(fmt, "{}", value),
            Self::Text(value) => write!(fmt, "{:?}", value),
            Self::Timestamp(value) => write!(fmt, "{}", value.to_rfc3339()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<U256> for Value {
    fn from(value: U256) -> Self {
        Self::Uint(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Uint(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}
