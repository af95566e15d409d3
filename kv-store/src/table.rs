//! Typed record tables with secondary indexes on top of `redb`.
//!
//! A record type `R` is stored in a primary table `R::TABLE` mapping primary
//! key to the JSON document, plus one multimap table per entry of
//! `R::INDEXES` mapping the encoded index key to the primary keys that carry
//! it. Multimap values are kept sorted, so records with equal index keys are
//! visited in primary-key order.

use core::{marker::PhantomData, ops::Bound};

use redb::{
    MultimapTable, MultimapTableDefinition, ReadTransaction, ReadableMultimapTable,
    ReadableTable, Table, TableDefinition, WriteTransaction,
};
use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    planner::{plan, run_in_memory, Cursor, Plan, Source, Span},
    query::{Filter, Query},
    record::Record,
};

pub type PrimaryDefinition = TableDefinition<'static, &'static str, &'static [u8]>;
pub type IndexDefinition = MultimapTableDefinition<'static, &'static [u8], &'static str>;

pub type WriteTable<'txn, R> = KeyValueTable<
    R,
    Table<'txn, &'static str, &'static [u8]>,
    MultimapTable<'txn, &'static [u8], &'static str>,
>;

pub fn primary_definition<R: Record>() -> PrimaryDefinition {
    TableDefinition::new(R::TABLE)
}

pub fn index_definitions<R: Record>() -> impl Iterator<Item = IndexDefinition> {
    R::INDEXES
        .iter()
        .map(|index| MultimapTableDefinition::new(index.name))
}

/// A primary table and its indexes, bound to one transaction.
pub struct KeyValueTable<R, P, I> {
    primary: P,
    indexes: Vec<I>,
    record:  PhantomData<fn() -> R>,
}

/// Bind the tables of `R` for reading.
pub fn open_read<R: Record>(
    txn: &ReadTransaction,
) -> Result<
    KeyValueTable<
        R,
        impl ReadableTable<&'static str, &'static [u8]> + '_,
        impl ReadableMultimapTable<&'static [u8], &'static str> + '_,
    >,
> {
    let primary = txn.open_table(primary_definition::<R>())?;
    let indexes = index_definitions::<R>()
        .map(|definition| txn.open_multimap_table(definition))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(KeyValueTable {
        primary,
        indexes,
        record: PhantomData,
    })
}

/// Bind the tables of `R` for writing, creating any that are missing.
pub fn open_write<R: Record>(txn: &WriteTransaction) -> Result<WriteTable<'_, R>> {
    let primary = txn.open_table(primary_definition::<R>())?;
    let indexes = index_definitions::<R>()
        .map(|definition| txn.open_multimap_table(definition))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(KeyValueTable {
        primary,
        indexes,
        record: PhantomData,
    })
}

fn decode<R: Record>(bytes: &[u8]) -> Result<R> {
    Ok(serde_json::from_slice(bytes)?)
}

fn borrow_bound<T: ?Sized, K: AsRef<T>>(bound: &Bound<K>) -> Bound<&T> {
    match bound {
        Bound::Included(key) => Bound::Included(key.as_ref()),
        Bound::Excluded(key) => Bound::Excluded(key.as_ref()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Applies predicate, offset and limit to the records a cursor visits.
struct Sink<'q, R: Record> {
    predicate: Option<&'q Filter<R::Field>>,
    skip:      usize,
    remaining: Option<usize>,
    records:   Vec<R>,
}

impl<'q, R: Record> Sink<'q, R> {
    fn new(cursor: &'q Cursor<R::Field>) -> Self {
        Self {
            predicate: cursor.predicate.as_ref(),
            skip:      cursor.offset,
            remaining: cursor.limit,
            records:   Vec::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Consume one unit of offset without reading the record, if possible.
    fn skip_unread(&mut self) -> bool {
        if self.predicate.is_none() && self.skip > 0 {
            self.skip -= 1;
            true
        } else {
            false
        }
    }

    /// Returns whether more records are wanted.
    fn push(&mut self, record: R) -> Result<bool> {
        if let Some(predicate) = self.predicate {
            if !predicate.matches(&record)? {
                return Ok(true);
            }
        }
        if self.skip > 0 {
            self.skip -= 1;
            return Ok(true);
        }
        self.records.push(record);
        if let Some(remaining) = &mut self.remaining {
            *remaining -= 1;
        }
        Ok(!self.is_full())
    }
}

fn ordered<T>(spans: &[T], reverse: bool) -> Vec<&T> {
    if reverse {
        spans.iter().rev().collect()
    } else {
        spans.iter().collect()
    }
}

impl<R, P, I> KeyValueTable<R, P, I>
where
    R: Record,
    P: ReadableTable<&'static str, &'static [u8]>,
    I: ReadableMultimapTable<&'static [u8], &'static str>,
{
    pub fn get(&self, key: &str) -> Result<Option<R>> {
        match self.primary.get(key)? {
            Some(bytes) => decode(bytes.value()).map(Some),
            None => Ok(None),
        }
    }

    pub fn bulk_get<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<Option<R>>> {
        keys.iter().map(|key| self.get(key.as_ref())).collect()
    }

    pub fn contains_key(&self, key: &str) -> Result<bool> {
        Ok(self.primary.get(key)?.is_some())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(usize::try_from(self.primary.len()?).unwrap_or(usize::MAX))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.primary.is_empty()?)
    }

    /// All primary keys, ascending.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in self.primary.iter()? {
            let (key, _) = entry?;
            keys.push(key.value().to_owned());
        }
        Ok(keys)
    }

    /// All records in primary-key order.
    pub fn to_vec(&self) -> Result<Vec<R>> {
        let mut records = Vec::new();
        for entry in self.primary.iter()? {
            let (_, bytes) = entry?;
            records.push(decode(bytes.value())?);
        }
        Ok(records)
    }

    /// Primary keys in the order of the named index, skipping the first
    /// `skip`. Records are not read.
    pub fn keys_by_index(&self, name: &str, reverse: bool, skip: usize) -> Result<Vec<String>> {
        let position =
            R::index_named(name).ok_or_else(|| Error::UnknownIndex(name.to_owned()))?;
        let mut range = self.indexes[position].iter()?;
        let mut skip = skip;
        let mut keys = Vec::new();
        loop {
            let entry = if reverse { range.next_back() } else { range.next() };
            let (_, values) = match entry {
                Some(entry) => entry?,
                None => break,
            };
            for value in values {
                let value = value?;
                if skip > 0 {
                    skip -= 1;
                } else {
                    keys.push(value.value().to_owned());
                }
            }
        }
        Ok(keys)
    }

    pub fn find(&self, query: &Query<R::Field>) -> Result<Vec<R>> {
        let plan = plan::<R>(query);
        debug!(table = R::TABLE, native = plan.is_native(), "Planned query");
        self.find_with(query, &plan)
    }

    /// Run `query` with a given plan. The plan must come from [`plan`] for
    /// the same query, or be [`Plan::InMemory`].
    pub fn find_with(&self, query: &Query<R::Field>, plan: &Plan<R::Field>) -> Result<Vec<R>> {
        query.validate()?;
        match plan {
            Plan::Native(cursor) => self.scan(cursor),
            Plan::InMemory => run_in_memory(self.to_vec()?, query),
        }
    }

    pub fn count(&self, query: &Query<R::Field>) -> Result<usize> {
        if query.is_empty() {
            return self.len();
        }
        Ok(self.find(query)?.len())
    }

    pub fn scan(&self, cursor: &Cursor<R::Field>) -> Result<Vec<R>> {
        let mut sink = Sink::new(cursor);
        if !sink.is_full() {
            match &cursor.source {
                Source::Primary(spans) => self.scan_primary(spans, cursor.reverse, &mut sink)?,
                Source::Index { position, spans } => {
                    self.scan_index(*position, spans, cursor.reverse, &mut sink)?;
                }
            }
        }
        trace!(table = R::TABLE, found = sink.records.len(), "Scanned");
        Ok(sink.records)
    }

    fn scan_primary(
        &self,
        spans: &[Span<String>],
        reverse: bool,
        sink: &mut Sink<'_, R>,
    ) -> Result<()> {
        for (lower, upper) in ordered(spans, reverse) {
            let bounds: (Bound<&str>, Bound<&str>) = (borrow_bound(lower), borrow_bound(upper));
            let mut range = self.primary.range::<&str>(bounds)?;
            loop {
                let entry = if reverse { range.next_back() } else { range.next() };
                let (_, bytes) = match entry {
                    Some(entry) => entry?,
                    None => break,
                };
                if sink.skip_unread() {
                    continue;
                }
                if !sink.push(decode(bytes.value())?)? {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn scan_index(
        &self,
        position: usize,
        spans: &[Span<Vec<u8>>],
        reverse: bool,
        sink: &mut Sink<'_, R>,
    ) -> Result<()> {
        let index = &self.indexes[position];
        for (lower, upper) in ordered(spans, reverse) {
            let bounds: (Bound<&[u8]>, Bound<&[u8]>) = (borrow_bound(lower), borrow_bound(upper));
            let mut range = index.range::<&[u8]>(bounds)?;
            loop {
                let entry = if reverse { range.next_back() } else { range.next() };
                let (_, keys) = match entry {
                    Some(entry) => entry?,
                    None => break,
                };
                for key in keys {
                    let key = key?;
                    if sink.skip_unread() {
                        continue;
                    }
                    let key = key.value();
                    let record = self
                        .get(key)?
                        .ok_or_else(|| Error::DanglingIndex(key.to_owned()))?;
                    if !sink.push(record)? {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

impl<'txn, R: Record> WriteTable<'txn, R> {
    /// Insert a new record. Fails with [`Error::DuplicateKey`] if its primary
    /// key is taken.
    pub fn add(&mut self, record: &R) -> Result<()> {
        let key = record.primary_key();
        if self.contains_key(&key)? {
            return Err(Error::DuplicateKey(key));
        }
        self.write(&key, record)
    }

    /// Insert or overwrite a record, returning the previous one.
    pub fn put(&mut self, record: &R) -> Result<Option<R>> {
        let key = record.primary_key();
        let previous = self.get(&key)?;
        if let Some(previous) = &previous {
            self.unindex(&key, previous)?;
        }
        self.write(&key, record)?;
        Ok(previous)
    }

    /// Like [`put`](Self::put), but the record must keep the primary key
    /// `key`.
    pub fn replace(&mut self, key: &str, record: &R) -> Result<Option<R>> {
        let found = record.primary_key();
        if found != key {
            return Err(Error::KeyMismatch {
                expected: key.to_owned(),
                found,
            });
        }
        self.put(record)
    }

    pub fn delete(&mut self, key: &str) -> Result<Option<R>> {
        let previous = self.get(key)?;
        if let Some(previous) = &previous {
            self.primary.remove(key)?;
            self.unindex(key, previous)?;
        }
        Ok(previous)
    }

    pub fn clear(&mut self) -> Result<usize> {
        let keys = self.keys()?;
        for key in &keys {
            self.delete(key)?;
        }
        Ok(keys.len())
    }

    fn write(&mut self, key: &str, record: &R) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.primary.insert(key, bytes.as_slice())?;
        for (index, table) in R::INDEXES.iter().zip(&mut self.indexes) {
            table.insert(index.key(record).as_slice(), key)?;
        }
        Ok(())
    }

    fn unindex(&mut self, key: &str, record: &R) -> Result<()> {
        for (index, table) in R::INDEXES.iter().zip(&mut self.indexes) {
            table.remove(index.key(record).as_slice(), key)?;
        }
        Ok(())
    }
}
