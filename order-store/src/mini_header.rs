use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use web3::types::{Bytes, H256, U256};

use crate::utils::serde::u256_dec;

/// The parts of a block header the order validator keeps to detect reorgs.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiniHeader {
    pub hash:      H256,
    pub parent:    H256,
    #[serde(with = "u256_dec")]
    pub number:    U256,
    pub timestamp: DateTime<Utc>,
    /// Encoded event logs of the block, opaque to the store.
    pub logs:      Bytes,
}
