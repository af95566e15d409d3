use kv_store::{open_read, open_write, Query, Record, Sort, WriteTable};
use serde::Serialize;
use tracing::{debug, trace};
use web3::types::H256;

use super::{schema::MINI_HEADERS_BY_NUMBER, Database, Error, MiniHeaderField, Result, EVICTIONS};
use crate::mini_header::MiniHeader;

/// Outcome of [`Database::add_mini_headers`].
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize)]
pub struct AddedMiniHeaders {
    pub added:   Vec<MiniHeader>,
    pub removed: Vec<MiniHeader>,
}

fn key(hash: H256) -> String {
    format!("{:?}", hash)
}

/// Insert `headers`, skipping hashes already present. Returns the inserted.
fn insert(table: &mut WriteTable<'_, MiniHeader>, headers: Vec<MiniHeader>) -> Result<Vec<MiniHeader>> {
    let mut added = Vec::with_capacity(headers.len());
    for header in headers {
        match table.add(&header) {
            Ok(()) => added.push(header),
            Err(kv_store::Error::DuplicateKey(_)) => {}
            Err(error) => return Err(error.into()),
        }
    }
    Ok(added)
}

impl Database {
    /// Store new block headers, ignoring ones already stored, and keep only
    /// the `max_mini_headers` with the highest block numbers.
    pub async fn add_mini_headers(&self, headers: Vec<MiniHeader>) -> Result<AddedMiniHeaders> {
        trace!(count = headers.len(), "Adding mini headers");
        let max_mini_headers = self.max_mini_headers;
        let result = self
            .with_write("add_mini_headers", move |txn| {
                let mut table = open_write::<MiniHeader>(txn)?;
                let mut added = insert(&mut table, headers)?;
                let mut removed = Vec::new();
                for key in table.keys_by_index(MINI_HEADERS_BY_NUMBER, true, max_mini_headers)? {
                    let evicted = match table.delete(&key)? {
                        Some(evicted) => evicted,
                        None => continue,
                    };
                    EVICTIONS.with_label_values(&["mini_headers"]).inc();
                    match added.iter().position(|header| header.hash == evicted.hash) {
                        Some(position) => {
                            added.remove(position);
                        }
                        None => removed.push(evicted),
                    }
                }
                Ok(AddedMiniHeaders { added, removed })
            })
            .await?;
        debug!(
            added = result.added.len(),
            removed = result.removed.len(),
            "Added mini headers"
        );
        Ok(result)
    }

    /// Replace every stored header with `headers`.
    pub async fn reset_mini_headers(&self, headers: Vec<MiniHeader>) -> Result<()> {
        trace!(count = headers.len(), "Resetting mini headers");
        self.with_write("reset_mini_headers", move |txn| {
            let mut table = open_write::<MiniHeader>(txn)?;
            table.clear()?;
            insert(&mut table, headers)?;
            Ok(())
        })
        .await
    }

    pub async fn get_mini_header(&self, hash: H256) -> Result<MiniHeader> {
        self.with_read("get_mini_header", move |txn| {
            open_read::<MiniHeader>(txn)?
                .get(&key(hash))?
                .ok_or(Error::NotFound)
        })
        .await
    }

    /// The stored header with the highest block number.
    pub async fn get_latest_mini_header(&self) -> Result<MiniHeader> {
        let query = Query::new().sort(Sort::desc(MiniHeaderField::Number)).limit(1);
        self.with_read("get_latest_mini_header", move |txn| {
            open_read::<MiniHeader>(txn)?
                .find(&query)?
                .pop()
                .ok_or(Error::NotFound)
        })
        .await
    }

    pub async fn find_mini_headers(&self, query: Query<MiniHeaderField>) -> Result<Vec<MiniHeader>> {
        self.with_read("find_mini_headers", move |txn| {
            Ok(open_read::<MiniHeader>(txn)?.find(&query)?)
        })
        .await
    }

    pub async fn count_mini_headers(&self, query: Query<MiniHeaderField>) -> Result<usize> {
        self.with_read("count_mini_headers", move |txn| {
            Ok(open_read::<MiniHeader>(txn)?.count(&query)?)
        })
        .await
    }

    pub async fn delete_mini_header(&self, hash: H256) -> Result<()> {
        self.with_write("delete_mini_header", move |txn| {
            open_write::<MiniHeader>(txn)?.delete(&key(hash))?;
            Ok(())
        })
        .await
    }

    pub async fn delete_mini_headers(
        &self,
        query: Query<MiniHeaderField>,
    ) -> Result<Vec<MiniHeader>> {
        self.with_write("delete_mini_headers", move |txn| {
            let mut table = open_write::<MiniHeader>(txn)?;
            let headers = table.find(&query)?;
            for header in &headers {
                table.delete(&header.primary_key())?;
            }
            Ok(headers)
        })
        .await
    }
}

#[cfg(test)]
pub mod test {
    use kv_store::{Filter, FilterKind};
    use pretty_assertions::assert_eq;
    use web3::types::U256;

    use super::*;
    use crate::{database::test::database, mini_header::test::mini_header};

    fn numbers(headers: &[MiniHeader]) -> Vec<u64> {
        headers.iter().map(|header| header.number.as_u64()).collect()
    }

    #[tokio::test]
    async fn keeps_highest_numbers() {
        let database = database("headers-retention", 3, 3).await;
        let result = database
            .add_mini_headers((1..=5).map(mini_header).collect())
            .await
            .unwrap();
        assert_eq!(numbers(&result.added), vec![3, 4, 5]);
        assert!(result.removed.is_empty());

        let result = database
            .add_mini_headers(vec![mini_header(6), mini_header(4)])
            .await
            .unwrap();
        assert_eq!(numbers(&result.added), vec![6]);
        assert_eq!(numbers(&result.removed), vec![3]);

        let stored = database
            .find_mini_headers(Query::new().sort(Sort::asc(MiniHeaderField::Number)))
            .await
            .unwrap();
        assert_eq!(numbers(&stored), vec![4, 5, 6]);
        assert_eq!(
            database.get_latest_mini_header().await.unwrap(),
            mini_header(6)
        );
    }

    #[tokio::test]
    async fn numbers_sort_numerically() {
        let database = database("headers-numeric", 3, 30).await;
        database
            .add_mini_headers(vec![mini_header(9), mini_header(10), mini_header(100)])
            .await
            .unwrap();
        let stored = database
            .find_mini_headers(
                Query::new().filter(Filter::new(MiniHeaderField::Number, FilterKind::Greater, 9_u64)),
            )
            .await
            .unwrap();
        assert_eq!(numbers(&stored), vec![10, 100]);
        assert_eq!(
            database.get_latest_mini_header().await.unwrap().number,
            U256::from(100_u64)
        );
    }

    #[tokio::test]
    async fn test_reset_mini_headers() {
        let database = database("headers-reset", 3, 10).await;
        database
            .add_mini_headers((1..=4).map(mini_header).collect())
            .await
            .unwrap();
        database
            .reset_mini_headers(vec![mini_header(20), mini_header(21), mini_header(20)])
            .await
            .unwrap();
        let stored = database.find_mini_headers(Query::new()).await.unwrap();
        assert_eq!(numbers(&stored), vec![20, 21]);
        assert!(matches!(
            database.get_mini_header(mini_header(1).hash).await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn duplicate_hash_keeps_stored_header() {
        let database = database("headers-duplicate", 3, 10).await;
        database.add_mini_headers(vec![mini_header(5)]).await.unwrap();
        let mut conflicting = mini_header(5);
        conflicting.number = U256::from(500_u64);
        conflicting.logs = web3::types::Bytes(vec![0xde, 0xad]);
        let result = database
            .add_mini_headers(vec![conflicting])
            .await
            .unwrap();
        assert_eq!(result, AddedMiniHeaders::default());
        assert_eq!(
            database.get_mini_header(mini_header(5).hash).await.unwrap(),
            mini_header(5)
        );
        assert_eq!(database.count_mini_headers(Query::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reset_to_nothing_empties_the_table() {
        let database = database("headers-reset-empty", 3, 10).await;
        database
            .add_mini_headers((1..=3).map(mini_header).collect())
            .await
            .unwrap();
        database.reset_mini_headers(vec![]).await.unwrap();
        assert_eq!(database.count_mini_headers(Query::new()).await.unwrap(), 0);
        assert!(matches!(
            database.get_latest_mini_header().await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_mini_headers() {
        let database = database("headers-delete", 3, 10).await;
        assert!(matches!(
            database.get_latest_mini_header().await,
            Err(Error::NotFound)
        ));
        database
            .add_mini_headers((1..=5).map(mini_header).collect())
            .await
            .unwrap();
        let deleted = database
            .delete_mini_headers(Query::new().filter(Filter::new(
                MiniHeaderField::Number,
                FilterKind::LessOrEqual,
                2_u64,
            )))
            .await
            .unwrap();
        assert_eq!(numbers(&deleted), vec![1, 2]);
        database.delete_mini_header(mini_header(5).hash).await.unwrap();
        assert_eq!(
            database.count_mini_headers(Query::new()).await.unwrap(),
            2
        );
        let parent = format!("{:?}", mini_header(4).parent);
        let children = database
            .find_mini_headers(Query::new().filter(Filter::equal(MiniHeaderField::Parent, parent.as_str())))
            .await
            .unwrap();
        assert_eq!(numbers(&children), vec![4]);
    }
}
