//! Query model: filters, sort keys and pagination over a record's fields.

use core::{cmp::Ordering, str::FromStr};

use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::{
    error::{Error, Result},
    record::{Field, Record},
    value::{Value, ValueKind},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, EnumString, IntoStaticStr)]
pub enum FilterKind {
    #[strum(serialize = "=")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterOrEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessOrEqual,
    #[strum(serialize = "CONTAINS")]
    Contains,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl SortDirection {
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Filter<F> {
    pub field: F,
    pub kind:  FilterKind,
    pub value: Value,
}

impl<F: Field> Filter<F> {
    pub fn new(field: F, kind: FilterKind, value: impl Into<Value>) -> Self {
        Self {
            field,
            kind,
            value: value.into(),
        }
    }

    pub fn equal(field: F, value: impl Into<Value>) -> Self {
        Self::new(field, FilterKind::Equal, value)
    }

    /// Build a filter from its wire form, coercing `value` to the field's kind.
    pub fn parse(field: F, kind: &str, value: &JsonValue) -> Result<Self> {
        let kind =
            FilterKind::from_str(kind).map_err(|_| Error::UnsupportedFilter(kind.to_owned()))?;
        let value = Value::from_json(field.kind(), value).ok_or_else(|| {
            Error::InvalidValue {
                field:    field.name(),
                expected: field.kind(),
                value:    value.to_string(),
            }
        })?;
        Ok(Self { field, kind, value })
    }

    pub fn validate(&self) -> Result<()> {
        let expected = self.field.kind();
        if self.kind == FilterKind::Contains && expected != ValueKind::Text {
            return Err(Error::TypeMismatch {
                field: self.field.name(),
                expected: ValueKind::Text,
                found: expected,
            });
        }
        if self.value.kind() != expected {
            return Err(Error::TypeMismatch {
                field: self.field.name(),
                expected,
                found: self.value.kind(),
            });
        }
        Ok(())
    }

    pub fn test(&self, actual: &Value) -> Result<bool> {
        Ok(match self.kind {
            FilterKind::Equal => *actual == self.value,
            FilterKind::NotEqual => *actual != self.value,
            FilterKind::Greater => *actual > self.value,
            FilterKind::GreaterOrEqual => *actual >= self.value,
            FilterKind::Less => *actual < self.value,
            FilterKind::LessOrEqual => *actual <= self.value,
            FilterKind::Contains => {
                match (actual.as_text(), self.value.as_text()) {
                    (Some(haystack), Some(needle)) => haystack.contains(needle),
                    _ => {
                        return Err(Error::TypeMismatch {
                            field:    self.field.name(),
                            expected: ValueKind::Text,
                            found:    actual.kind(),
                        })
                    }
                }
            }
        })
    }

    pub fn matches<R: Record<Field = F>>(&self, record: &R) -> Result<bool> {
        self.test(&record.field(self.field))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFilter<F> {
    field: F,
    kind:  String,
    value: JsonValue,
}

impl<'de, F: Field + Deserialize<'de>> Deserialize<'de> for Filter<F> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawFilter::<F>::deserialize(deserializer)?;
        Self::parse(raw.field, &raw.kind, &raw.value).map_err(D::Error::custom)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub struct Sort<F> {
    pub field:     F,
    pub direction: SortDirection,
}

impl<F> Sort<F> {
    pub const fn asc(field: F) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub const fn desc(field: F) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }
}

/// Filters, sort keys and pagination. Results are the slice
/// `[offset, offset + limit)` of the filtered, sorted records.
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(bound(deserialize = "F: Field + Deserialize<'de>"))]
pub struct Query<F> {
    #[serde(default = "Vec::new")]
    pub filters: Vec<Filter<F>>,
    #[serde(default = "Vec::new")]
    pub sort:    Vec<Sort<F>>,
    #[serde(default)]
    pub limit:   Option<usize>,
    #[serde(default)]
    pub offset:  Option<usize>,
}

impl<F> Default for Query<F> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            sort:    Vec::new(),
            limit:   None,
            offset:  None,
        }
    }
}

impl<F: Field> Query<F> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter<F>) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: Sort<F>) -> Self {
        self.sort.push(sort);
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// A query without filters, sort or pagination selects every record.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
            && self.sort.is_empty()
            && self.limit.is_none()
            && self.offset.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        self.filters.iter().try_for_each(Filter::validate)
    }

    /// Compare two precomputed sort keys, left to right.
    pub fn compare_keys(&self, a: &[Value], b: &[Value]) -> Ordering {
        self.sort
            .iter()
            .zip(a.iter().zip(b))
            .map(|(sort, (a, b))| sort.direction.apply(a.cmp(b)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}
