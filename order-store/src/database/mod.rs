mod metadata;
mod mini_headers;
mod orders;
pub mod schema;

use core::fmt::Debug;

use kv_store::{open_write, BatchingStore, ReadTransaction, Storage, WriteTransaction};
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, register_int_gauge, IntCounterVec, IntGauge};
use structopt::StructOpt;
use thiserror::Error;
use tracing::info;

pub use self::{
    mini_headers::AddedMiniHeaders,
    orders::{AddedOrders, StoredOrderStatus},
    schema::{MetadataField, MiniHeaderField, OrderField},
};
use crate::{metadata::Metadata, mini_header::MiniHeader, orders::OrderWithMetadata};

pub const DHT_STORE: &str = "dhtstore";
pub const PEER_STORE: &str = "peerstore";

static OPS_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("db_operations", "Database operations by kind.", &["kind"]).unwrap()
});
static EVICTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "db_evictions",
        "Records evicted to stay within the configured maximum.",
        &["table"]
    )
    .unwrap()
});
static ORDERS: Lazy<IntGauge> =
    Lazy::new(|| register_int_gauge!("db_orders", "Number of orders in the database.").unwrap());

#[derive(Debug, Error)]
pub enum Error {
    #[error("record not found")]
    NotFound,
    #[error("metadata already exists")]
    AlreadyExists,
    #[error("found more than one metadata record, metadata was cleared")]
    Corruption,
    #[error(transparent)]
    Store(#[from] kv_store::Error),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Clone, PartialEq, Eq, Debug, StructOpt)]
pub struct Options {
    /// Database file, or `memory:<name>` for a store that lives in memory.
    #[structopt(long, env = "DATA_SOURCE_NAME", default_value = "0x_mesh/db/mesh.redb")]
    pub data_source_name: String,

    /// Orders beyond this count are evicted, unpinned and latest expiring
    /// first.
    #[structopt(long, env = "MAX_ORDERS", default_value = "100000")]
    pub max_orders: usize,

    /// Number of most recent block headers to retain.
    #[structopt(long, env = "MAX_MINI_HEADERS", default_value = "20")]
    pub max_mini_headers: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self::from_iter(&[""])
    }
}

/// The order relay's persistent store. Every method runs in a single storage
/// transaction.
#[derive(Clone)]
pub struct Database {
    storage:          Storage,
    max_orders:       usize,
    max_mini_headers: usize,
    dht_store:        BatchingStore,
    peer_store:       BatchingStore,
}

impl Debug for Database {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        fmt.debug_tuple("Database").field(&self.storage.name()).finish()
    }
}

impl Database {
    pub async fn open(options: Options) -> Result<Self> {
        info!(
            data_source = %options.data_source_name,
            max_orders = options.max_orders,
            max_mini_headers = options.max_mini_headers,
            "Opening database"
        );
        let storage = Storage::open(&options.data_source_name).await?;
        storage
            .with_write(|txn| -> Result<()> {
                open_write::<OrderWithMetadata>(txn)?;
                open_write::<MiniHeader>(txn)?;
                open_write::<Metadata>(txn)?;
                Ok(())
            })
            .await?;
        let dht_store = BatchingStore::open(storage.clone(), DHT_STORE).await?;
        let peer_store = BatchingStore::open(storage.clone(), PEER_STORE).await?;
        Ok(Self {
            storage,
            max_orders: options.max_orders,
            max_mini_headers: options.max_mini_headers,
            dht_store,
            peer_store,
        })
    }

    pub const fn dht_store(&self) -> &BatchingStore {
        &self.dht_store
    }

    pub const fn peer_store(&self) -> &BatchingStore {
        &self.peer_store
    }

    async fn with_read<F, T>(&self, kind: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&ReadTransaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        OPS_COUNTER.with_label_values(&[kind]).inc();
        self.storage.with_read(f).await
    }

    async fn with_write<F, T>(&self, kind: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&WriteTransaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        OPS_COUNTER.with_label_values(&[kind]).inc();
        self.storage.with_write(f).await
    }
}


#[cfg(feature = "bench")]
pub mod bench {
    use criterion::{black_box, BatchSize, Criterion};
    use kv_store::{open_read, Filter, FilterKind, Plan, Query, Sort};

    use super::*;
    use crate::bench::runtime;

    pub fn group(criterion: &mut Criterion) {
        bench_find_orders(criterion);
    }

    fn bench_find_orders(criterion: &mut Criterion) {
        let runtime = runtime();
        let database = runtime.block_on(async {
            let database = Database::open(Options {
                data_source_name: "memory:bench".to_owned(),
                max_orders:       10_000,
                max_mini_headers: 20,
            })
            .await
            .unwrap();
            let orders = (0..2_000)
                .map(|id| crate::bench::order(id, 1_000 + id % 97, id % 5 == 0))
                .collect();
            database.add_orders(orders).await.unwrap();
            database
        });
        let query = Query::new()
            .filter(Filter::new(
                OrderField::ExpirationTimeSeconds,
                FilterKind::Greater,
                1_050_u64,
            ))
            .sort(Sort::desc(OrderField::ExpirationTimeSeconds))
            .limit(20);
        for (name, native) in [("find_orders_native", true), ("find_orders_in_memory", false)] {
            let runtime = &runtime;
            let storage = database.storage.clone();
            let query = query.clone();
            criterion.bench_function(name, move |bencher| {
                bencher.iter_batched(
                    || (storage.clone(), query.clone()),
                    |(storage, query)| {
                        runtime.block_on(storage.with_read(move |txn| -> Result<usize> {
                            let table = open_read::<OrderWithMetadata>(txn)?;
                            let plan = if native {
                                kv_store::planner::plan::<OrderWithMetadata>(&query)
                            } else {
                                Plan::InMemory
                            };
                            Ok(black_box(table.find_with(&query, &plan)?.len()))
                        }))
                    },
                    BatchSize::SmallInput,
                );
            });
        }
    }
}
