use thiserror::Error;

use crate::value::ValueKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("record with primary key {0} already exists")]
    DuplicateKey(String),
    #[error("record primary key changed from {expected} to {found}")]
    KeyMismatch { expected: String, found: String },
    #[error("unsupported filter kind {0:?}")]
    UnsupportedFilter(String),
    #[error("field {field} is of type {expected}, got {found}")]
    TypeMismatch {
        field:    &'static str,
        expected: ValueKind,
        found:    ValueKind,
    },
    #[error("invalid value for field {field} of type {expected}: {value}")]
    InvalidValue {
        field:    &'static str,
        expected: ValueKind,
        value:    String,
    },
    #[error("index entry points at missing record {0}")]
    DanglingIndex(String),
    #[error("no index named {0}")]
    UnknownIndex(String),
    #[error("data source {0} is already open")]
    AlreadyOpen(String),
    #[error("storage engine error")]
    Storage(#[from] redb::Error),
    #[error("record encoding error")]
    Codec(#[from] serde_json::Error),
    #[error("storage worker failed")]
    Task(#[from] tokio::task::JoinError),
    #[error("io error")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

// The engine reports one error type per stage. Funnel them all through
// `redb::Error` so `?` works everywhere.
macro_rules! storage_error {
    ($($source:ty),*) => {
        $(
            impl From<$source> for Error {
                fn from(error: $source) -> Self {
                    Self::Storage(error.into())
                }
            }
        )*
    };
}

storage_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError
);
