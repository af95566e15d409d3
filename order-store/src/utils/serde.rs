use std::borrow::Cow;

use serde::{
    de::{Deserialize, Deserializer, Error},
    ser::Serializer,
};
use web3::types::U256;

fn try_hex(str: &str) -> Option<&str> {
    if str.len() >= 2 && (&str[..2] == "0x" || &str[..2] == "0X") {
        Some(&str[2..])
    } else {
        None
    }
}

fn parse_u256<E: Error>(str: &str) -> Result<U256, E> {
    try_hex(str).map_or_else(
        || U256::from_dec_str(str).map_err(E::custom),
        |hex| U256::from_str_radix(hex, 16).map_err(E::custom),
    )
}

/// Serialize using [`ToString`], which for numbers gives a decimal string.
pub fn to_string<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: ToString,
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn u256_from_str<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let str = <Cow<'de, str>>::deserialize(deserializer)?;
    parse_u256(&str)
}

pub fn opt_to_string<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: ToString,
    S: Serializer,
{
    match value {
        Some(value) => serializer.serialize_some(&value.to_string()),
        None => serializer.serialize_none(),
    }
}

pub fn opt_u256_from_str<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<U256>, D::Error> {
    <Option<Cow<'de, str>>>::deserialize(deserializer)?
        .map(|str| parse_u256(&str))
        .transpose()
}

pub mod u256_dec {
    pub use super::{to_string as serialize, u256_from_str as deserialize};
}

pub mod opt_u256_dec {
    pub use super::{opt_to_string as serialize, opt_u256_from_str as deserialize};
}
