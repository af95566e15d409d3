#![doc = include_str!("../Readme.md")]
#![warn(clippy::all, clippy::pedantic, clippy::cargo, clippy::nursery)]

pub mod batch;
mod error;
pub mod planner;
pub mod query;
pub mod record;
pub mod storage;
pub mod table;
pub mod value;

pub use redb::{ReadTransaction, WriteTransaction};

pub use crate::{
    batch::{BatchingStore, Entry, Operation, PrefixQuery},
    error::{Error, Result},
    planner::Plan,
    query::{Filter, FilterKind, Query, Sort, SortDirection},
    record::{Field, Index, Record},
    storage::Storage,
    table::{open_read, open_write, KeyValueTable, WriteTable},
    value::{Value, ValueKind},
};
