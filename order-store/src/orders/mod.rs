mod metadata;
mod order;
mod order_with_metadata;
mod signed_order;

pub use self::{
    metadata::{OrderMetadata, SingleAssetData},
    order::Order,
    order_with_metadata::OrderWithMetadata,
    signed_order::SignedOrder,
};

#[cfg(test)]
pub use self::order_with_metadata::test::order;
