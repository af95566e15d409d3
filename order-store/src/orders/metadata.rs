use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use web3::types::{Address, H256, U256};

use crate::utils::serde::{opt_u256_dec, u256_dec};

/// One token referenced by an order's asset data.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct SingleAssetData {
    pub address:  Address,
    #[serde(
        rename = "tokenID",
        with = "opt_u256_dec",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub token_id: Option<U256>,
}

/// Mutable, node-local state of a stored order.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMetadata {
    pub hash:                        H256,
    #[serde(with = "u256_dec")]
    pub fillable_taker_asset_amount: U256,
    pub last_updated:                DateTime<Utc>,
    pub is_removed:                  bool,
    pub is_pinned:                   bool,
    pub parsed_maker_asset_data:     Vec<SingleAssetData>,
    pub parsed_maker_fee_asset_data: Vec<SingleAssetData>,
    #[serde(with = "u256_dec")]
    pub last_validated_block_number: U256,
    pub last_validated_block_hash:   H256,
}
