use serde::{Deserialize, Serialize};
use web3::types::H256;

use super::{OrderMetadata, SignedOrder};

/// A stored order: the signed order plus its metadata, flattened into one
/// JSON document.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct OrderWithMetadata {
    #[serde(flatten)]
    pub signed_order: SignedOrder,
    #[serde(flatten)]
    pub metadata:     OrderMetadata,
}

impl OrderWithMetadata {
    pub const fn hash(&self) -> H256 {
        self.metadata.hash
    }

    /// Orders that are not pinned are evicted first.
    pub const fn is_not_pinned(&self) -> bool {
        !self.metadata.is_pinned
    }
}
