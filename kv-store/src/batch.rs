//! Flat string key-value namespaces with atomic batch commit.

use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{error::Result, storage::Storage};

type Definition = TableDefinition<'static, &'static str, &'static str>;

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    Put { key: String, value: String },
    Delete { key: String },
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Entry {
    pub key:   String,
    pub value: String,
}

impl Entry {
    /// Size of the value in bytes.
    pub fn size(&self) -> usize {
        self.value.len()
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct PrefixQuery {
    pub prefix: String,
    pub limit:  Option<usize>,
    pub offset: usize,
}

#[derive(Clone, Debug)]
pub struct BatchingStore {
    storage: Storage,
    name:    &'static str,
}

impl BatchingStore {
    /// Bind the namespace `name` of `storage`, creating it if missing.
    pub async fn open(storage: Storage, name: &'static str) -> Result<Self> {
        storage
            .with_write(move |txn| -> Result<()> {
                txn.open_table(Definition::new(name))?;
                Ok(())
            })
            .await?;
        Ok(Self { storage, name })
    }

    fn definition(&self) -> Definition {
        Definition::new(self.name)
    }

    /// Apply `operations` in order, atomically.
    pub async fn commit(&self, operations: Vec<Operation>) -> Result<()> {
        trace!(store = self.name, count = operations.len(), "Committing batch");
        let definition = self.definition();
        self.storage
            .with_write(move |txn| -> Result<()> {
                let mut table = txn.open_table(definition)?;
                for operation in &operations {
                    match operation {
                        Operation::Put { key, value } => {
                            table.insert(key.as_str(), value.as_str())?;
                        }
                        Operation::Delete { key } => {
                            table.remove(key.as_str())?;
                        }
                    }
                }
                Ok(())
            })
            .await
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.commit(vec![Operation::Put {
            key:   key.to_owned(),
            value: value.to_owned(),
        }])
        .await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.commit(vec![Operation::Delete {
            key: key.to_owned(),
        }])
        .await
    }

    /// The value at `key`, or the empty string if there is none.
    pub async fn get(&self, key: &str) -> Result<String> {
        Ok(self.lookup(key).await?.unwrap_or_default())
    }

    /// Byte length of the value at `key`, `0` if there is none.
    pub async fn get_size(&self, key: &str) -> Result<usize> {
        Ok(self.lookup(key).await?.map_or(0, |value| value.len()))
    }

    pub async fn has(&self, key: &str) -> Result<bool> {
        let definition = self.definition();
        let key = key.to_owned();
        self.storage
            .with_read(move |txn| -> Result<bool> {
                let table = txn.open_table(definition)?;
                let found = table.get(key.as_str())?.is_some();
                Ok(found)
            })
            .await
    }

    async fn lookup(&self, key: &str) -> Result<Option<String>> {
        let definition = self.definition();
        let key = key.to_owned();
        self.storage
            .with_read(move |txn| -> Result<Option<String>> {
                let table = txn.open_table(definition)?;
                let value = table.get(key.as_str())?.map(|value| value.value().to_owned());
                Ok(value)
            })
            .await
    }

    /// Entries whose key starts with `query.prefix`, in key order, after
    /// skipping `query.offset` and up to `query.limit`.
    pub async fn query(&self, query: PrefixQuery) -> Result<Vec<Entry>> {
        let definition = self.definition();
        self.storage
            .with_read(move |txn| -> Result<Vec<Entry>> {
                let table = txn.open_table(definition)?;
                let mut skip = query.offset;
                let mut entries = Vec::new();
                for entry in table.range(query.prefix.as_str()..)? {
                    if query.limit.map_or(false, |limit| entries.len() >= limit) {
                        break;
                    }
                    let (key, value) = entry?;
                    let key = key.value();
                    if !key.starts_with(query.prefix.as_str()) {
                        break;
                    }
                    if skip > 0 {
                        skip -= 1;
                        continue;
                    }
                    entries.push(Entry {
                        key:   key.to_owned(),
                        value: value.value().to_owned(),
                    });
                }
                Ok(entries)
            })
            .await
    }
}
