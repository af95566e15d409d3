//! Chooses between serving a query from storage order and evaluating it in
//! memory over the whole table.
//!
//! A query can be served natively when it has at most one filter and at most
//! one sort key, both on the same field, and that field is addressable: it
//! has a single-field index or is the text primary key. Everything else falls
//! back to loading the table and filtering, sorting and slicing in memory.
//!
//! When the query is sorted, or has no filter, both paths return the same
//! records in the same order. An unsorted filtered query comes back in scan
//! order: index order natively, primary-key order in memory. Without offset
//! or limit the two results hold the same records; with them, each is a
//! slice of its own order.

use core::ops::Bound;

use crate::{
    error::Result,
    query::{Filter, FilterKind, Query, Sort, SortDirection},
    record::Record,
    value::Value,
};

/// A contiguous key range, in storage order.
pub type Span<K> = (Bound<K>, Bound<K>);

/// Where a native scan reads from.
#[derive(Clone, PartialEq, Debug)]
pub enum Source {
    /// The primary table, by primary key.
    Primary(Vec<Span<String>>),
    /// A secondary index, by encoded index key.
    Index {
        position: usize,
        spans:    Vec<Span<Vec<u8>>>,
    },
}

impl Source {
    fn everything() -> Self {
        Self::Primary(vec![(Bound::Unbounded, Bound::Unbounded)])
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Cursor<F> {
    pub source:    Source,
    /// Evaluated on every visited record before offset and limit.
    pub predicate: Option<Filter<F>>,
    pub reverse:   bool,
    pub offset:    usize,
    pub limit:     Option<usize>,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Plan<F> {
    Native(Cursor<F>),
    InMemory,
}

impl<F> Plan<F> {
    pub const fn is_native(&self) -> bool {
        matches!(self, Self::Native(_))
    }
}

pub fn can_use_native_indexes<R: Record>(query: &Query<R::Field>) -> bool {
    if query.filters.len() > 1 || query.sort.len() > 1 {
        return false;
    }
    match (query.filters.first(), query.sort.first()) {
        (Some(filter), Some(sort)) if filter.field != sort.field => false,
        // Substring matches scan the primary table.
        (Some(filter), None) if filter.kind == FilterKind::Contains => true,
        (Some(Filter { field, .. }), _) | (None, Some(Sort { field, .. })) => {
            R::is_addressable(*field)
        }
        (None, None) => true,
    }
}

pub fn plan<R: Record>(query: &Query<R::Field>) -> Plan<R::Field> {
    if !can_use_native_indexes::<R>(query) {
        return Plan::InMemory;
    }
    let filter = query.filters.first();
    let sort = query.sort.first();
    let (source, predicate) = match (filter, sort) {
        (Some(filter), _) if filter.kind == FilterKind::Contains => {
            let source = sort.map_or_else(Source::everything, |sort| source::<R>(sort.field, None));
            (source, Some(filter.clone()))
        }
        (Some(filter), _) => (source::<R>(filter.field, Some(filter)), None),
        (None, Some(sort)) => (source::<R>(sort.field, None), None),
        (None, None) => (Source::everything(), None),
    };
    Plan::Native(Cursor {
        source,
        predicate,
        reverse: sort.map_or(false, |sort| sort.direction == SortDirection::Desc),
        offset: query.offset.unwrap_or(0),
        limit: query.limit,
    })
}

fn source<R: Record>(field: R::Field, filter: Option<&Filter<R::Field>>) -> Source {
    let kind = filter.map_or(FilterKind::Contains, |filter| filter.kind);
    match (R::index_of(field), filter.map(|filter| &filter.value)) {
        (Some(position), value) => {
            Source::Index {
                position,
                spans: spans(kind, value.map(Value::encode)),
            }
        }
        (None, value) => {
            let key = value.and_then(Value::as_text).map(str::to_owned);
            Source::Primary(spans(kind, key))
        }
    }
}

fn spans<K: Clone>(kind: FilterKind, key: Option<K>) -> Vec<Span<K>> {
    use Bound::{Excluded, Included, Unbounded};
    let key = match key {
        Some(key) if kind != FilterKind::Contains => key,
        _ => return vec![(Unbounded, Unbounded)],
    };
    match kind {
        FilterKind::Equal => vec![(Included(key.clone()), Included(key))],
        FilterKind::NotEqual => vec![(Unbounded, Excluded(key.clone())), (Excluded(key), Unbounded)],
        FilterKind::Greater => vec![(Excluded(key), Unbounded)],
        FilterKind::GreaterOrEqual => vec![(Included(key), Unbounded)],
        FilterKind::Less => vec![(Unbounded, Excluded(key))],
        FilterKind::LessOrEqual => vec![(Unbounded, Included(key))],
        FilterKind::Contains => vec![(Unbounded, Unbounded)],
    }
}

/// Filter, stable sort and slice `records`, which must be in primary-key
/// order.
pub fn run_in_memory<R: Record>(records: Vec<R>, query: &Query<R::Field>) -> Result<Vec<R>> {
    let mut records = records;
    for filter in &query.filters {
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            if filter.matches(&record)? {
                kept.push(record);
            }
        }
        records = kept;
    }
    if !query.sort.is_empty() {
        let mut keyed = records
            .into_iter()
            .map(|record| {
                let key = query
                    .sort
                    .iter()
                    .map(|sort| record.field(sort.field))
                    .collect::<Vec<_>>();
                (key, record)
            })
            .collect::<Vec<_>>();
        keyed.sort_by(|(a, _), (b, _)| query.compare_keys(a, b));
        records = keyed.into_iter().map(|(_, record)| record).collect();
    }
    Ok(paginate(records, query.offset, query.limit))
}

pub fn paginate<T>(
    items: impl IntoIterator<Item = T>,
    offset: Option<usize>,
    limit: Option<usize>,
) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.unwrap_or(0))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}
