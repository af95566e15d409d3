use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Node-wide bookkeeping. At most one is stored.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "ethereumChainID")]
    pub ethereum_chain_id: u64,
    #[serde(rename = "ethRPCRequestsSentInCurrentUTCDay")]
    pub eth_rpc_requests_sent_in_current_utc_day: u64,
    #[serde(rename = "startOfCurrentUTCDay")]
    pub start_of_current_utc_day: DateTime<Utc>,
}
