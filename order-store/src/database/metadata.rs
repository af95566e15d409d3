use kv_store::{open_read, open_write, Record};
use tracing::{info, warn};

use super::{Database, Error, Result};
use crate::metadata::Metadata;

/// The single row of `rows`, if there is exactly one.
fn single(mut rows: Vec<Metadata>) -> Result<Metadata> {
    match (rows.pop(), rows.is_empty()) {
        (None, _) => Err(Error::NotFound),
        (Some(metadata), true) => Ok(metadata),
        (Some(_), false) => Err(Error::Corruption),
    }
}

impl Database {
    /// The stored metadata. If more than one record is found they are all
    /// deleted and [`Error::Corruption`] is returned.
    pub async fn get_metadata(&self) -> Result<Metadata> {
        let rows = self
            .with_read("get_metadata", |txn| {
                Ok(open_read::<Metadata>(txn)?.to_vec()?)
            })
            .await?;
        match single(rows) {
            Err(Error::Corruption) => self.clear_corrupt_metadata().await,
            result => result,
        }
    }

    /// Delete every metadata record, then fail with [`Error::Corruption`].
    async fn clear_corrupt_metadata<T>(&self) -> Result<T> {
        let count = self
            .with_write("clear_metadata", |txn| {
                Ok(open_write::<Metadata>(txn)?.clear()?)
            })
            .await?;
        warn!(count, "Multiple metadata records, cleared");
        Err(Error::Corruption)
    }

    /// Store the metadata. Fails with [`Error::AlreadyExists`] if there is
    /// one already.
    pub async fn save_metadata(&self, metadata: Metadata) -> Result<()> {
        self.with_write("save_metadata", move |txn| {
            let mut table = open_write::<Metadata>(txn)?;
            if !table.is_empty()? {
                return Err(Error::AlreadyExists);
            }
            table.add(&metadata)?;
            Ok(())
        })
        .await?;
        info!("Saved metadata");
        Ok(())
    }

    /// Replace the metadata by `update` applied to it, atomically. Multiple
    /// records are cleared as in [`Database::get_metadata`].
    pub async fn update_metadata<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(Metadata) -> Metadata + Send + 'static,
    {
        let result = self
            .with_write("update_metadata", move |txn| {
                let mut table = open_write::<Metadata>(txn)?;
                let existing = single(table.to_vec()?)?;
                table.delete(&existing.primary_key())?;
                table.put(&update(existing))?;
                Ok(())
            })
            .await;
        match result {
            Err(Error::Corruption) => self.clear_corrupt_metadata().await,
            result => result,
        }
    }
}

#[cfg(test)]
pub mod test {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;
    use crate::database::test::database;

    fn metadata(chain_id: u64) -> Metadata {
        Metadata {
            ethereum_chain_id: chain_id,
            eth_rpc_requests_sent_in_current_utc_day: 0,
            start_of_current_utc_day: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn save_then_get() {
        let database = database("metadata-save", 10, 10).await;
        assert!(matches!(database.get_metadata().await, Err(Error::NotFound)));
        database.save_metadata(metadata(1337)).await.unwrap();
        assert_eq!(database.get_metadata().await.unwrap(), metadata(1337));
        assert!(matches!(
            database.save_metadata(metadata(1)).await,
            Err(Error::AlreadyExists)
        ));
        assert_eq!(database.get_metadata().await.unwrap(), metadata(1337));
    }

    #[tokio::test]
    async fn update_keeps_a_single_record() {
        let database = database("metadata-update", 10, 10).await;
        assert!(matches!(
            database.update_metadata(|metadata| metadata).await,
            Err(Error::NotFound)
        ));
        database.save_metadata(metadata(1337)).await.unwrap();
        database
            .update_metadata(|mut metadata| {
                metadata.eth_rpc_requests_sent_in_current_utc_day += 5;
                metadata
            })
            .await
            .unwrap();
        assert_eq!(
            database
                .get_metadata()
                .await
                .unwrap()
                .eth_rpc_requests_sent_in_current_utc_day,
            5
        );

        database
            .update_metadata(|mut metadata| {
                metadata.ethereum_chain_id = 1;
                metadata
            })
            .await
            .unwrap();
        assert_eq!(database.get_metadata().await.unwrap().ethereum_chain_id, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn multiple_records_are_cleared() {
        let database = database("metadata-corrupt", 10, 10).await;
        database
            .with_write("test", |txn| {
                let mut table = open_write::<Metadata>(txn)?;
                table.add(&metadata(1))?;
                table.add(&metadata(2))?;
                Ok(())
            })
            .await
            .unwrap();
        assert!(matches!(database.get_metadata().await, Err(Error::Corruption)));
        assert!(logs_contain("Multiple metadata records"));
        assert!(matches!(database.get_metadata().await, Err(Error::NotFound)));
        database.save_metadata(metadata(3)).await.unwrap();
        assert_eq!(database.get_metadata().await.unwrap(), metadata(3));
    }

    #[tokio::test]
    #[traced_test]
    async fn update_clears_multiple_records() {
        let database = database("metadata-corrupt-update", 10, 10).await;
        database
            .with_write("test", |txn| {
                let mut table = open_write::<Metadata>(txn)?;
                table.add(&metadata(1))?;
                table.add(&metadata(2))?;
                Ok(())
            })
            .await
            .unwrap();
        assert!(matches!(
            database.update_metadata(|metadata| metadata).await,
            Err(Error::Corruption)
        ));
        assert!(logs_contain("Multiple metadata records, cleared"));
        assert!(matches!(database.get_metadata().await, Err(Error::NotFound)));
    }
}
