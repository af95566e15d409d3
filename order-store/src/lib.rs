#![doc = include_str!("../Readme.md")]
#![warn(clippy::all, clippy::pedantic, clippy::cargo, clippy::nursery)]

pub mod database;
pub mod metadata;
pub mod mini_header;
pub mod orders;
pub mod utils;

pub use crate::{
    database::{
        AddedMiniHeaders, AddedOrders, Database, Error, MetadataField, MiniHeaderField, Options,
        OrderField, StoredOrderStatus,
    },
    metadata::Metadata,
    mini_header::MiniHeader,
    orders::{Order, OrderMetadata, OrderWithMetadata, SignedOrder, SingleAssetData},
};

#[cfg(feature = "bench")]
pub mod bench {
    use criterion::Criterion;
    use tokio::runtime;
    use web3::types::H256;

    use crate::OrderWithMetadata;

    pub fn main(criterion: &mut Criterion) {
        crate::database::bench::group(criterion);
    }

    /// Constructs an executor for async benchmarks
    pub(crate) fn runtime() -> runtime::Runtime {
        runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    pub(crate) fn order(id: u64, expiration: u64, pinned: bool) -> OrderWithMetadata {
        let mut order = OrderWithMetadata::default();
        order.metadata.hash = H256::from_low_u64_be(id);
        order.metadata.is_pinned = pinned;
        order.signed_order.order.expiration_time_seconds = expiration.into();
        order
    }
}
