use core::fmt::Debug;
use std::{
    collections::HashSet,
    fs,
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use once_cell::sync::Lazy;
use prometheus::{
    exponential_buckets, register_histogram_vec, register_int_counter_vec, HistogramVec,
    IntCounterVec,
};
use redb::{backends::InMemoryBackend, Database, ReadTransaction, WriteTransaction};
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Data source names with this prefix live in memory only.
pub const MEMORY_PREFIX: &str = "memory:";

static TRANSACTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "kv_transactions",
        "Storage transactions by mode and outcome.",
        &["mode", "outcome"]
    )
    .unwrap()
});
static LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "kv_transaction_latency_seconds",
        "Storage transaction latency in seconds.",
        &["mode"],
        exponential_buckets(0.0001, 2.0, 16).unwrap()
    )
    .unwrap()
});

/// Names of the data sources currently held by a [`Storage`] in this process.
static OPEN: Lazy<Mutex<HashSet<String>>> = Lazy::new(Mutex::default);

/// Claim on a data source name, released on drop.
struct Lease {
    name: String,
}

impl Lease {
    fn acquire(name: &str) -> Result<Self> {
        if OPEN
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned())
        {
            Ok(Self {
                name: name.to_owned(),
            })
        } else {
            Err(Error::AlreadyOpen(name.to_owned()))
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        OPEN.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
        debug!(name = %self.name, "Released data source");
    }
}

// Fields drop in order: the database is closed before the lease goes.
struct Inner {
    database: Database,
    lease:    Lease,
}

/// Handle to an open data source. Clones share the same database; the data
/// source can be opened again once every clone is dropped.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<Inner>,
}

impl Debug for Storage {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        fmt.debug_tuple("Storage").field(&self.inner.lease.name).finish()
    }
}

impl Storage {
    /// Open or create the data source `name`. Fails with
    /// [`Error::AlreadyOpen`] while another handle to it is alive.
    pub async fn open(name: &str) -> Result<Self> {
        let lease = Lease::acquire(name)?;
        let database = spawn_blocking({
            let name = name.to_owned();
            move || create(&name)
        })
        .await??;
        info!(name, "Opened data source");
        Ok(Self {
            inner: Arc::new(Inner { database, lease }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.lease.name
    }

    /// Run `f` in a read transaction on a blocking worker thread.
    pub async fn with_read<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadTransaction) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<Error> + Send + 'static,
    {
        let _timer = LATENCY.with_label_values(&["read"]).start_timer(); // Observes on drop
        let inner = self.inner.clone();
        let result = spawn_blocking(move || {
            let txn = inner.database.begin_read().map_err(Error::from)?;
            f(&txn)
        })
        .await
        .map_err(|error| E::from(Error::from(error)))?;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        TRANSACTIONS.with_label_values(&["read", outcome]).inc();
        result
    }

    /// Run `f` in a write transaction on a blocking worker thread. The
    /// transaction commits if `f` succeeds and is aborted otherwise.
    pub async fn with_write<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&WriteTransaction) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<Error> + Send + 'static,
    {
        let _timer = LATENCY.with_label_values(&["write"]).start_timer(); // Observes on drop
        let inner = self.inner.clone();
        let result = spawn_blocking(move || {
            let txn = inner.database.begin_write().map_err(Error::from)?;
            match f(&txn) {
                Ok(value) => {
                    txn.commit().map_err(Error::from)?;
                    Ok(value)
                }
                Err(error) => {
                    if let Err(abort) = txn.abort() {
                        warn!(name = %inner.lease.name, ?abort, "Failed to abort transaction");
                    }
                    Err(error)
                }
            }
        })
        .await
        .map_err(|error| E::from(Error::from(error)))?;
        let outcome = if result.is_ok() { "commit" } else { "abort" };
        TRANSACTIONS.with_label_values(&["write", outcome]).inc();
        result
    }
}

fn create(name: &str) -> Result<Database> {
    if name.starts_with(MEMORY_PREFIX) {
        return Ok(Database::builder().create_with_backend(InMemoryBackend::new())?);
    }
    let path = Path::new(name);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(Database::create(path)?)
}
