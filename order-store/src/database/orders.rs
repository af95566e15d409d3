use kv_store::{open_read, open_write, Query, Record, WriteTransaction};
use serde::Serialize;
use tracing::{debug, trace};
use web3::types::{H256, U256};

use super::{schema::ORDERS_BY_PRIORITY, Database, Error, OrderField, Result, EVICTIONS, ORDERS};
use crate::orders::OrderWithMetadata;

/// Outcome of [`Database::add_orders`].
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedOrders {
    /// Hashes of orders that were already stored.
    pub already_stored: Vec<H256>,
    /// Orders inserted and still stored after eviction.
    pub added:          Vec<OrderWithMetadata>,
    /// Previously stored orders evicted to make room.
    pub removed:        Vec<OrderWithMetadata>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StoredOrderStatus {
    NotStored,
    /// Stored, but marked as removed by the validator.
    Removed {
        fillable_taker_asset_amount: U256,
    },
    Active {
        fillable_taker_asset_amount: U256,
    },
}

impl StoredOrderStatus {
    pub const fn is_stored(&self) -> bool {
        !matches!(self, Self::NotStored)
    }

    pub const fn fillable_taker_asset_amount(&self) -> Option<U256> {
        match self {
            Self::NotStored => None,
            Self::Removed {
                fillable_taker_asset_amount,
            }
            | Self::Active {
                fillable_taker_asset_amount,
            } => Some(*fillable_taker_asset_amount),
        }
    }
}

fn key(hash: H256) -> String {
    format!("{:?}", hash)
}

/// Insert `orders` and evict down to `max_orders`, in `txn`.
pub(super) fn insert_orders(
    txn: &WriteTransaction,
    orders: Vec<OrderWithMetadata>,
    max_orders: usize,
) -> Result<AddedOrders> {
    let mut table = open_write::<OrderWithMetadata>(txn)?;
    let mut result = AddedOrders::default();
    for order in orders {
        match table.add(&order) {
            Ok(()) => result.added.push(order),
            Err(kv_store::Error::DuplicateKey(_)) => result.already_stored.push(order.hash()),
            Err(error) => return Err(error.into()),
        }
    }
    for key in table.keys_by_index(ORDERS_BY_PRIORITY, false, max_orders)? {
        let evicted = match table.delete(&key)? {
            Some(evicted) => evicted,
            None => continue,
        };
        EVICTIONS.with_label_values(&["orders"]).inc();
        let hash = evicted.hash();
        match result.added.iter().position(|order| order.hash() == hash) {
            Some(position) => {
                result.added.remove(position);
            }
            None => result.removed.push(evicted),
        }
    }
    ORDERS.set(i64::try_from(table.len()?).unwrap_or(i64::MAX));
    Ok(result)
}

impl Database {
    /// Store new orders. Orders whose hash is already stored are reported in
    /// `already_stored`. If the store then holds more than `max_orders`, the
    /// lowest priority orders are evicted; an order evicted in the same call
    /// it was added in is reported in neither `added` nor `removed`.
    pub async fn add_orders(&self, orders: Vec<OrderWithMetadata>) -> Result<AddedOrders> {
        trace!(count = orders.len(), "Adding orders");
        let max_orders = self.max_orders;
        let result = self
            .with_write("add_orders", move |txn| insert_orders(txn, orders, max_orders))
            .await?;
        debug!(
            added = result.added.len(),
            already_stored = result.already_stored.len(),
            removed = result.removed.len(),
            "Added orders"
        );
        Ok(result)
    }

    pub async fn get_order(&self, hash: H256) -> Result<OrderWithMetadata> {
        trace!(?hash, "Getting order");
        self.with_read("get_order", move |txn| {
            open_read::<OrderWithMetadata>(txn)?
                .get(&key(hash))?
                .ok_or(Error::NotFound)
        })
        .await
    }

    /// Status of each of `hashes`, in order.
    pub async fn get_order_statuses(&self, hashes: Vec<H256>) -> Result<Vec<StoredOrderStatus>> {
        self.with_read("get_order_statuses", move |txn| {
            let table = open_read::<OrderWithMetadata>(txn)?;
            let keys = hashes.into_iter().map(key).collect::<Vec<_>>();
            let statuses = table
                .bulk_get(&keys)?
                .into_iter()
                .map(|order| {
                    match order {
                        None => StoredOrderStatus::NotStored,
                        Some(order) if order.metadata.is_removed => {
                            StoredOrderStatus::Removed {
                                fillable_taker_asset_amount: order
                                    .metadata
                                    .fillable_taker_asset_amount,
                            }
                        }
                        Some(order) => {
                            StoredOrderStatus::Active {
                                fillable_taker_asset_amount: order
                                    .metadata
                                    .fillable_taker_asset_amount,
                            }
                        }
                    }
                })
                .collect();
            Ok(statuses)
        })
        .await
    }

    pub async fn find_orders(&self, query: Query<OrderField>) -> Result<Vec<OrderWithMetadata>> {
        self.with_read("find_orders", move |txn| {
            Ok(open_read::<OrderWithMetadata>(txn)?.find(&query)?)
        })
        .await
    }

    pub async fn count_orders(&self, query: Query<OrderField>) -> Result<usize> {
        self.with_read("count_orders", move |txn| {
            Ok(open_read::<OrderWithMetadata>(txn)?.count(&query)?)
        })
        .await
    }

    /// Remove the order with `hash`. Nothing happens if it is not stored.
    pub async fn delete_order(&self, hash: H256) -> Result<()> {
        trace!(?hash, "Deleting order");
        self.with_write("delete_order", move |txn| {
            open_write::<OrderWithMetadata>(txn)?.delete(&key(hash))?;
            Ok(())
        })
        .await
    }

    /// Remove every order matching `query` and return them.
    pub async fn delete_orders(
        &self,
        query: Query<OrderField>,
    ) -> Result<Vec<OrderWithMetadata>> {
        let deleted = self
            .with_write("delete_orders", move |txn| {
                let mut table = open_write::<OrderWithMetadata>(txn)?;
                let orders = table.find(&query)?;
                for order in &orders {
                    table.delete(&order.primary_key())?;
                }
                Ok(orders)
            })
            .await?;
        debug!(count = deleted.len(), "Deleted orders");
        Ok(deleted)
    }

    /// Replace the order with `hash` by `update` applied to it, atomically.
    /// The update must not change the hash.
    pub async fn update_order<F>(&self, hash: H256, update: F) -> Result<()>
    where
        F: FnOnce(OrderWithMetadata) -> OrderWithMetadata + Send + 'static,
    {
        trace!(?hash, "Updating order");
        self.with_write("update_order", move |txn| {
            let key = key(hash);
            let mut table = open_write::<OrderWithMetadata>(txn)?;
            let existing = table.get(&key)?.ok_or(Error::NotFound)?;
            table.replace(&key, &update(existing))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
pub mod test {
    use std::collections::{BTreeMap, HashSet};

    use kv_store::{Filter, FilterKind, Sort};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::{database::test::database, orders::order};

    fn hashes(orders: &[OrderWithMetadata]) -> Vec<H256> {
        orders.iter().map(OrderWithMetadata::hash).collect()
    }

    #[tokio::test]
    async fn duplicate_hashes_are_reported_not_stored_twice() {
        let database = database("orders-duplicates", 10, 10).await;
        let first = database
            .add_orders(vec![order(1, 100, false), order(2, 100, false)])
            .await
            .unwrap();
        assert_eq!(hashes(&first.added), hashes(&[order(1, 0, false), order(2, 0, false)]));

        let mut changed = order(1, 999, true);
        changed.metadata.is_removed = true;
        let second = database
            .add_orders(vec![changed, order(3, 100, false), order(3, 100, false)])
            .await
            .unwrap();
        assert_eq!(second.already_stored, vec![
            H256::from_low_u64_be(1),
            H256::from_low_u64_be(3)
        ]);
        assert_eq!(hashes(&second.added), vec![H256::from_low_u64_be(3)]);
        assert_eq!(database.count_orders(Query::new()).await.unwrap(), 3);
        let stored = database.get_order(H256::from_low_u64_be(1)).await.unwrap();
        assert_eq!(stored, order(1, 100, false));
    }

    #[tokio::test]
    async fn eviction_keeps_pinned_and_soonest_expiring() {
        // Scenario: three unpinned orders, then a pinned one with the latest
        // expiration. The latest-expiring unpinned order goes.
        let database = database("orders-eviction", 3, 10).await;
        let a = order(1, 100, false);
        let b = order(2, 200, false);
        let c = order(3, 300, false);
        database
            .add_orders(vec![a.clone(), b.clone(), c.clone()])
            .await
            .unwrap();

        let d = order(4, 400, true);
        let result = database.add_orders(vec![d.clone()]).await.unwrap();
        assert_eq!(result.added, vec![d.clone()]);
        assert_eq!(result.removed, vec![c]);
        assert!(result.already_stored.is_empty());

        let stored = database
            .find_orders(Query::new().sort(Sort::asc(OrderField::Hash)))
            .await
            .unwrap();
        assert_eq!(stored, vec![a, b, d]);
    }

    #[tokio::test]
    async fn single_call_keeps_pinned_then_soonest_expiring() {
        let database = database("orders-eviction-single-call", 3, 10).await;
        let pinned = order(1, 500, true);
        let orders = vec![
            pinned.clone(),
            order(2, 100, false),
            order(3, 200, false),
            order(4, 300, false),
            order(5, 400, false),
        ];
        let result = database.add_orders(orders).await.unwrap();
        assert_eq!(hashes(&result.added), vec![
            H256::from_low_u64_be(1),
            H256::from_low_u64_be(2),
            H256::from_low_u64_be(3)
        ]);
        assert!(result.removed.is_empty());
        assert!(result.already_stored.is_empty());

        let stored = database.find_orders(Query::new()).await.unwrap();
        assert_eq!(hashes(&stored), vec![
            H256::from_low_u64_be(1),
            H256::from_low_u64_be(2),
            H256::from_low_u64_be(3)
        ]);
        assert_eq!(stored[0], pinned);
    }

    #[tokio::test]
    async fn order_added_and_evicted_in_one_call_is_not_reported() {
        let database = database("orders-added-evicted", 2, 10).await;
        let a = order(1, 100, false);
        let b = order(2, 200, false);
        database.add_orders(vec![a.clone(), b.clone()]).await.unwrap();

        let late = order(3, 900, false);
        let result = database.add_orders(vec![late]).await.unwrap();
        assert!(result.added.is_empty());
        assert!(result.removed.is_empty());
        assert_eq!(database.count_orders(Query::new()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_call_leaves_no_trace() {
        let database = database("orders-atomic", 10, 10).await;
        database.add_orders(vec![order(1, 100, false)]).await.unwrap();

        let result = database
            .with_write("test", |txn| {
                insert_orders(txn, vec![order(2, 100, false), order(3, 100, false)], 10)?;
                Err::<(), _>(Error::NotFound)
            })
            .await;
        assert!(matches!(result, Err(Error::NotFound)));
        assert_eq!(database.count_orders(Query::new()).await.unwrap(), 1);
        assert_eq!(
            database
                .count_orders(
                    Query::new().filter(Filter::equal(OrderField::ExpirationTimeSeconds, 100_u64))
                )
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_get_order_statuses() {
        let database = database("orders-statuses", 10, 10).await;
        let mut removed = order(2, 100, false);
        removed.metadata.is_removed = true;
        database
            .add_orders(vec![order(1, 100, false), removed])
            .await
            .unwrap();
        let statuses = database
            .get_order_statuses(vec![
                H256::from_low_u64_be(1),
                H256::from_low_u64_be(2),
                H256::from_low_u64_be(3),
            ])
            .await
            .unwrap();
        assert_eq!(statuses, vec![
            StoredOrderStatus::Active {
                fillable_taker_asset_amount: 1001.into(),
            },
            StoredOrderStatus::Removed {
                fillable_taker_asset_amount: 1002.into(),
            },
            StoredOrderStatus::NotStored,
        ]);
        assert!(!statuses[2].is_stored());
        assert_eq!(statuses[1].fillable_taker_asset_amount(), Some(1002.into()));
    }

    #[tokio::test]
    async fn missing_order_is_not_found() {
        let database = database("orders-missing", 10, 10).await;
        assert!(matches!(
            database.get_order(H256::from_low_u64_be(9)).await,
            Err(Error::NotFound)
        ));
        assert!(matches!(
            database.update_order(H256::from_low_u64_be(9), |order| order).await,
            Err(Error::NotFound)
        ));
        database.delete_order(H256::from_low_u64_be(9)).await.unwrap();
    }

    #[tokio::test]
    async fn update_order_rewrites_indexes() {
        let database = database("orders-update", 10, 10).await;
        database
            .add_orders(vec![order(1, 100, false), order(2, 200, false)])
            .await
            .unwrap();
        database
            .update_order(H256::from_low_u64_be(1), |mut order| {
                order.metadata.fillable_taker_asset_amount = 0.into();
                order.metadata.is_removed = true;
                order
            })
            .await
            .unwrap();
        let removed = database
            .find_orders(Query::new().filter(Filter::equal(OrderField::IsRemoved, true)))
            .await
            .unwrap();
        assert_eq!(hashes(&removed), vec![H256::from_low_u64_be(1)]);
        assert_eq!(removed[0].metadata.fillable_taker_asset_amount, U256::zero());

        let result = database
            .update_order(H256::from_low_u64_be(2), |mut order| {
                order.metadata.hash = H256::from_low_u64_be(5);
                order
            })
            .await;
        assert!(matches!(
            result,
            Err(Error::Store(kv_store::Error::KeyMismatch { .. }))
        ));
        assert!(database.get_order(H256::from_low_u64_be(5)).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_orders() {
        let database = database("orders-delete", 10, 10).await;
        database
            .add_orders((1..=6).map(|id| order(id, id * 10, false)).collect())
            .await
            .unwrap();
        let deleted = database
            .delete_orders(Query::new().filter(Filter::new(
                OrderField::ExpirationTimeSeconds,
                FilterKind::Greater,
                40_u64,
            )))
            .await
            .unwrap();
        assert_eq!(hashes(&deleted), vec![
            H256::from_low_u64_be(5),
            H256::from_low_u64_be(6)
        ]);
        assert_eq!(database.count_orders(Query::new()).await.unwrap(), 4);
        database.delete_order(H256::from_low_u64_be(1)).await.unwrap();
        assert_eq!(database.count_orders(Query::new()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn query_on_maker_address_with_contains_and_fallback() {
        let database = database("orders-queries", 10, 10).await;
        database
            .add_orders((1..=6).map(|id| order(id, 100 - id, id % 2 == 0)).collect())
            .await
            .unwrap();

        // maker_address is id % 3
        let maker = format!("{:?}", web3::types::Address::from_low_u64_be(1));
        let by_maker = database
            .find_orders(
                Query::new()
                    .filter(Filter::equal(OrderField::MakerAddress, maker.as_str()))
                    .sort(Sort::desc(OrderField::MakerAddress)),
            )
            .await
            .unwrap();
        assert_eq!(hashes(&by_maker), vec![
            H256::from_low_u64_be(1),
            H256::from_low_u64_be(4)
        ]);

        let pinned_by_expiration = database
            .find_orders(
                Query::new()
                    .filter(Filter::equal(OrderField::IsPinned, true))
                    .sort(Sort::asc(OrderField::ExpirationTimeSeconds))
                    .limit(2),
            )
            .await
            .unwrap();
        assert_eq!(hashes(&pinned_by_expiration), vec![
            H256::from_low_u64_be(6),
            H256::from_low_u64_be(4)
        ]);

        let suffix = database
            .find_orders(Query::new().filter(Filter::new(
                OrderField::Hash,
                FilterKind::Contains,
                "0005",
            )))
            .await
            .unwrap();
        assert_eq!(hashes(&suffix), vec![H256::from_low_u64_be(5)]);

        let error = database
            .find_orders(Query::new().filter(Filter::new(
                OrderField::IsPinned,
                FilterKind::Contains,
                "true",
            )))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            Error::Store(kv_store::Error::TypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn maker_filter_sorted_by_expiration() {
        let database = database("orders-maker-expiration", 10, 10).await;
        database
            .add_orders((1..=7).map(|id| order(id, id * 10, false)).collect())
            .await
            .unwrap();
        // maker_address is id % 3
        let maker = format!("{:?}", web3::types::Address::from_low_u64_be(1));
        let query = Query::new()
            .filter(Filter::equal(OrderField::MakerAddress, maker.as_str()))
            .sort(Sort::desc(OrderField::ExpirationTimeSeconds));
        let found = database.find_orders(query.clone()).await.unwrap();
        assert_eq!(hashes(&found), vec![
            H256::from_low_u64_be(7),
            H256::from_low_u64_be(4),
            H256::from_low_u64_be(1)
        ]);
        assert_eq!(database.count_orders(query.offset(1)).await.unwrap(), 2);
    }

    /// The `max_orders` best orders by (unpinned, expiration, hash).
    fn ranked(orders: &BTreeMap<H256, OrderWithMetadata>, max_orders: usize) -> HashSet<H256> {
        let mut ranked = orders.values().collect::<Vec<_>>();
        ranked.sort_by_key(|order| {
            (
                order.is_not_pinned(),
                order.signed_order.order.expiration_time_seconds,
                order.hash(),
            )
        });
        ranked
            .into_iter()
            .take(max_orders)
            .map(OrderWithMetadata::hash)
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn eviction_keeps_highest_ranked(
            batches in proptest::collection::vec(
                proptest::collection::vec((0_u64..40, 0_u64..20, any::<bool>()), 0..8),
                1..5,
            ),
            max_orders in 1_usize..10,
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let name = format!(
                    "orders-ranking-prop-{}",
                    std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap()
                        .as_nanos()
                );
                let database = database(&name, max_orders, 10).await;
                let mut expected = BTreeMap::new();
                for batch in batches {
                    let orders = batch
                        .into_iter()
                        .map(|(id, expiration, pinned)| order(id, expiration, pinned))
                        .collect::<Vec<_>>();
                    for order in &orders {
                        expected.entry(order.hash()).or_insert_with(|| order.clone());
                    }
                    let kept = ranked(&expected, max_orders);
                    expected.retain(|hash, _| kept.contains(hash));

                    database.add_orders(orders).await.unwrap();
                    let stored = database.find_orders(Query::new()).await.unwrap();
                    assert_eq!(
                        stored.iter().map(OrderWithMetadata::hash).collect::<HashSet<_>>(),
                        kept
                    );
                }
            });
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn eviction_never_exceeds_maximum(
            batches in proptest::collection::vec(
                proptest::collection::vec((0_u64..40, 0_u64..50, any::<bool>()), 0..8),
                1..5,
            ),
            max_orders in 1_usize..10,
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let name = format!(
                    "orders-eviction-prop-{}",
                    std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap()
                        .as_nanos()
                );
                let database = database(&name, max_orders, 10).await;
                let mut stored = HashSet::new();
                for batch in batches {
                    let orders = batch
                        .into_iter()
                        .map(|(id, expiration, pinned)| order(id, expiration, pinned))
                        .collect::<Vec<_>>();
                    let result = database.add_orders(orders).await.unwrap();
                    for order in &result.added {
                        assert!(stored.insert(order.hash()));
                    }
                    for order in &result.removed {
                        assert!(stored.remove(&order.hash()));
                    }
                    let all = database.find_orders(Query::new()).await.unwrap();
                    assert!(all.len() <= max_orders);
                    assert_eq!(all.iter().map(OrderWithMetadata::hash).collect::<HashSet<_>>(), stored);
                }
            });
        }
    }
}
