use serde::{Deserialize, Serialize};
use web3::types::Bytes;

use super::Order;

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    #[serde(flatten)]
    pub order:     Order,
    pub signature: Bytes,
}
