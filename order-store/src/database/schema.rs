//! Tables, fields and indexes of the persisted records.
//!
//! Addresses, hashes and byte strings are exposed to queries as lower-case
//! `0x` hex text, amounts and block numbers as unsigned integers. Parsed asset
//! data is exposed as its JSON text, for substring matching.

use core::fmt::Debug;

use kv_store::{Field, Index, Record, Value, ValueKind};
use serde::Deserialize;
use strum_macros::{EnumString, EnumVariantNames, IntoStaticStr};
use web3::types::Bytes;

use crate::{
    metadata::Metadata,
    mini_header::MiniHeader,
    orders::{OrderWithMetadata, SingleAssetData},
    utils::hex_string,
};

/// Compound index that orders eviction candidates: unpinned orders last,
/// then by expiration.
pub const ORDERS_BY_PRIORITY: &str = "orders_isNotPinned_expirationTimeSeconds";
pub const MINI_HEADERS_BY_NUMBER: &str = "miniHeaders_number";

fn text(value: impl Debug) -> Value {
    Value::Text(format!("{:?}", value))
}

fn bytes(value: &Bytes) -> Value {
    Value::Text(hex_string(&value.0))
}

fn asset_data(value: &[SingleAssetData]) -> Value {
    Value::Text(serde_json::to_string(value).unwrap_or_default())
}

macro_rules! index {
    ($field:ident, $name:expr, $($fields:ident),+) => {
        Index {
            name:   $name,
            fields: &[$($field::$fields),+],
        }
    };
}

#[derive(
    Clone, Copy, PartialEq, Eq, Debug, Deserialize, EnumString, EnumVariantNames, IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum OrderField {
    Hash,
    ChainId,
    ExchangeAddress,
    MakerAddress,
    MakerAssetData,
    MakerFeeAssetData,
    MakerAssetAmount,
    MakerFee,
    TakerAddress,
    TakerAssetData,
    TakerFeeAssetData,
    TakerAssetAmount,
    TakerFee,
    SenderAddress,
    FeeRecipientAddress,
    ExpirationTimeSeconds,
    Salt,
    Signature,
    FillableTakerAssetAmount,
    LastUpdated,
    IsRemoved,
    IsPinned,
    IsNotPinned,
    ParsedMakerAssetData,
    ParsedMakerFeeAssetData,
    LastValidatedBlockNumber,
    LastValidatedBlockHash,
}

impl Field for OrderField {
    fn name(self) -> &'static str {
        self.into()
    }

    fn kind(self) -> ValueKind {
        match self {
            Self::ChainId
            | Self::MakerAssetAmount
            | Self::MakerFee
            | Self::TakerAssetAmount
            | Self::TakerFee
            | Self::ExpirationTimeSeconds
            | Self::Salt
            | Self::FillableTakerAssetAmount
            | Self::LastValidatedBlockNumber => ValueKind::Uint,
            Self::IsRemoved | Self::IsPinned | Self::IsNotPinned => ValueKind::Bool,
            Self::LastUpdated => ValueKind::Timestamp,
            _ => ValueKind::Text,
        }
    }
}

impl Record for OrderWithMetadata {
    type Field = OrderField;

    const INDEXES: &'static [Index<OrderField>] = &[
        index!(OrderField, "orders_chainId", ChainId),
        index!(OrderField, "orders_exchangeAddress", ExchangeAddress),
        index!(OrderField, "orders_makerAddress", MakerAddress),
        index!(OrderField, "orders_makerAssetData", MakerAssetData),
        index!(OrderField, "orders_makerFeeAssetData", MakerFeeAssetData),
        index!(OrderField, "orders_makerAssetAmount", MakerAssetAmount),
        index!(OrderField, "orders_makerFee", MakerFee),
        index!(OrderField, "orders_takerAddress", TakerAddress),
        index!(OrderField, "orders_takerAssetData", TakerAssetData),
        index!(OrderField, "orders_takerFeeAssetData", TakerFeeAssetData),
        index!(OrderField, "orders_takerAssetAmount", TakerAssetAmount),
        index!(OrderField, "orders_takerFee", TakerFee),
        index!(OrderField, "orders_senderAddress", SenderAddress),
        index!(OrderField, "orders_feeRecipientAddress", FeeRecipientAddress),
        index!(OrderField, "orders_expirationTimeSeconds", ExpirationTimeSeconds),
        index!(OrderField, "orders_salt", Salt),
        index!(OrderField, "orders_signature", Signature),
        index!(OrderField, "orders_fillableTakerAssetAmount", FillableTakerAssetAmount),
        index!(OrderField, "orders_lastUpdated", LastUpdated),
        index!(OrderField, "orders_isRemoved", IsRemoved),
        index!(OrderField, "orders_isPinned", IsPinned),
        index!(OrderField, "orders_isNotPinned", IsNotPinned),
        index!(OrderField, "orders_lastValidatedBlockNumber", LastValidatedBlockNumber),
        index!(OrderField, "orders_lastValidatedBlockHash", LastValidatedBlockHash),
        index!(OrderField, ORDERS_BY_PRIORITY, IsNotPinned, ExpirationTimeSeconds),
    ];
    const PRIMARY_KEY: OrderField = OrderField::Hash;
    const TABLE: &'static str = "orders";

    fn primary_key(&self) -> String {
        format!("{:?}", self.metadata.hash)
    }

    fn field(&self, field: OrderField) -> Value {
        let order = &self.signed_order.order;
        let metadata = &self.metadata;
        match field {
            OrderField::Hash => text(metadata.hash),
            OrderField::ChainId => order.chain_id.into(),
            OrderField::ExchangeAddress => text(order.exchange_address),
            OrderField::MakerAddress => text(order.maker_address),
            OrderField::MakerAssetData => bytes(&order.maker_asset_data),
            OrderField::MakerFeeAssetData => bytes(&order.maker_fee_asset_data),
            OrderField::MakerAssetAmount => order.maker_asset_amount.into(),
            OrderField::MakerFee => order.maker_fee.into(),
            OrderField::TakerAddress => text(order.taker_address),
            OrderField::TakerAssetData => bytes(&order.taker_asset_data),
            OrderField::TakerFeeAssetData => bytes(&order.taker_fee_asset_data),
            OrderField::TakerAssetAmount => order.taker_asset_amount.into(),
            OrderField::TakerFee => order.taker_fee.into(),
            OrderField::SenderAddress => text(order.sender_address),
            OrderField::FeeRecipientAddress => text(order.fee_recipient_address),
            OrderField::ExpirationTimeSeconds => order.expiration_time_seconds.into(),
            OrderField::Salt => order.salt.into(),
            OrderField::Signature => bytes(&self.signed_order.signature),
            OrderField::FillableTakerAssetAmount => metadata.fillable_taker_asset_amount.into(),
            OrderField::LastUpdated => metadata.last_updated.into(),
            OrderField::IsRemoved => metadata.is_removed.into(),
            OrderField::IsPinned => metadata.is_pinned.into(),
            OrderField::IsNotPinned => self.is_not_pinned().into(),
            OrderField::ParsedMakerAssetData => asset_data(&metadata.parsed_maker_asset_data),
            OrderField::ParsedMakerFeeAssetData => {
                asset_data(&metadata.parsed_maker_fee_asset_data)
            }
            OrderField::LastValidatedBlockNumber => metadata.last_validated_block_number.into(),
            OrderField::LastValidatedBlockHash => text(metadata.last_validated_block_hash),
        }
    }
}

#[derive(
    Clone, Copy, PartialEq, Eq, Debug, Deserialize, EnumString, EnumVariantNames, IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum MiniHeaderField {
    Hash,
    Parent,
    Number,
    Timestamp,
    Logs,
}

impl Field for MiniHeaderField {
    fn name(self) -> &'static str {
        self.into()
    }

    fn kind(self) -> ValueKind {
        match self {
            Self::Number => ValueKind::Uint,
            Self::Timestamp => ValueKind::Timestamp,
            Self::Hash | Self::Parent | Self::Logs => ValueKind::Text,
        }
    }
}

impl Record for MiniHeader {
    type Field = MiniHeaderField;

    const INDEXES: &'static [Index<MiniHeaderField>] = &[
        index!(MiniHeaderField, "miniHeaders_parent", Parent),
        index!(MiniHeaderField, MINI_HEADERS_BY_NUMBER, Number),
        index!(MiniHeaderField, "miniHeaders_timestamp", Timestamp),
    ];
    const PRIMARY_KEY: MiniHeaderField = MiniHeaderField::Hash;
    const TABLE: &'static str = "miniHeaders";

    fn primary_key(&self) -> String {
        format!("{:?}", self.hash)
    }

    fn field(&self, field: MiniHeaderField) -> Value {
        match field {
            MiniHeaderField::Hash => text(self.hash),
            MiniHeaderField::Parent => text(self.parent),
            MiniHeaderField::Number => self.number.into(),
            MiniHeaderField::Timestamp => self.timestamp.into(),
            MiniHeaderField::Logs => bytes(&self.logs),
        }
    }
}

#[derive(
    Clone, Copy, PartialEq, Eq, Debug, Deserialize, EnumString, EnumVariantNames, IntoStaticStr,
)]
pub enum MetadataField {
    #[serde(rename = "ethereumChainID")]
    #[strum(serialize = "ethereumChainID")]
    EthereumChainId,
    #[serde(rename = "ethRPCRequestsSentInCurrentUTCDay")]
    #[strum(serialize = "ethRPCRequestsSentInCurrentUTCDay")]
    EthRpcRequestsSentInCurrentUtcDay,
    #[serde(rename = "startOfCurrentUTCDay")]
    #[strum(serialize = "startOfCurrentUTCDay")]
    StartOfCurrentUtcDay,
}

impl Field for MetadataField {
    fn name(self) -> &'static str {
        self.into()
    }

    fn kind(self) -> ValueKind {
        match self {
            Self::EthereumChainId | Self::EthRpcRequestsSentInCurrentUtcDay => ValueKind::Uint,
            Self::StartOfCurrentUtcDay => ValueKind::Timestamp,
        }
    }
}

impl Record for Metadata {
    type Field = MetadataField;

    const INDEXES: &'static [Index<MetadataField>] = &[];
    const PRIMARY_KEY: MetadataField = MetadataField::EthereumChainId;
    const TABLE: &'static str = "metadata";

    fn primary_key(&self) -> String {
        self.ethereum_chain_id.to_string()
    }

    fn field(&self, field: MetadataField) -> Value {
        match field {
            MetadataField::EthereumChainId => self.ethereum_chain_id.into(),
            MetadataField::EthRpcRequestsSentInCurrentUtcDay => {
                self.eth_rpc_requests_sent_in_current_utc_day.into()
            }
            MetadataField::StartOfCurrentUtcDay => self.start_of_current_utc_day.into(),
        }
    }
}
