use serde::{Deserialize, Serialize};
use web3::types::{Address, Bytes, U256};

use crate::utils::serde::u256_dec;

/// Immutable fields of a 0x v3 order, as signed by the maker.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub chain_id:                u64,
    pub exchange_address:        Address,
    pub maker_address:           Address,
    pub maker_asset_data:        Bytes,
    pub maker_fee_asset_data:    Bytes,
    #[serde(with = "u256_dec")]
    pub maker_asset_amount:      U256,
    #[serde(with = "u256_dec")]
    pub maker_fee:               U256,
    pub taker_address:           Address,
    pub taker_asset_data:        Bytes,
    pub taker_fee_asset_data:    Bytes,
    #[serde(with = "u256_dec")]
    pub taker_asset_amount:      U256,
    #[serde(with = "u256_dec")]
    pub taker_fee:               U256,
    pub sender_address:          Address,
    pub fee_recipient_address:   Address,
    #[serde(with = "u256_dec")]
    pub expiration_time_seconds: U256,
    #[serde(with = "u256_dec")]
    pub salt:                    U256,
}
