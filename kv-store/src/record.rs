use core::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};

use crate::value::{Value, ValueKind};

/// A named field of a [`Record`], usually a fieldless enum.
pub trait Field: Copy + Eq + Debug + Send + Sync + 'static {
    fn name(self) -> &'static str;

    fn kind(self) -> ValueKind;
}

/// A secondary index over one or more fields of a record.
///
/// Entries are ordered by the concatenated encoding of the indexed values,
/// then by primary key.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Index<F: 'static> {
    /// Name of the backing storage table. Unique per database.
    pub name:   &'static str,
    pub fields: &'static [F],
}

impl<F: Field> Index<F> {
    /// Whether this is a single-field index on `field`.
    pub fn covers(&self, field: F) -> bool {
        matches!(self.fields, [only] if *only == field)
    }

    pub fn key<R: Record<Field = F>>(&self, record: &R) -> Vec<u8> {
        let mut key = Vec::new();
        for field in self.fields {
            record.field(*field).encode_into(&mut key);
        }
        key
    }
}

/// A fixed-schema document stored in a [`KeyValueTable`].
///
/// [`KeyValueTable`]: crate::KeyValueTable
pub trait Record: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    type Field: Field;

    const TABLE: &'static str;

    /// The field the primary key is derived from.
    const PRIMARY_KEY: Self::Field;

    const INDEXES: &'static [Index<Self::Field>];

    fn primary_key(&self) -> String;

    fn field(&self, field: Self::Field) -> Value;

    /// Position of the single-field index on `field`, if there is one.
    fn index_of(field: Self::Field) -> Option<usize> {
        Self::INDEXES.iter().position(|index| index.covers(field))
    }

    fn index_named(name: &str) -> Option<usize> {
        Self::INDEXES.iter().position(|index| index.name == name)
    }

    /// Whether range and order requests on `field` can be served from
    /// storage order. True for indexed fields and for a text primary key.
    fn is_addressable(field: Self::Field) -> bool {
        (field == Self::PRIMARY_KEY && field.kind() == ValueKind::Text)
            || Self::index_of(field).is_some()
    }
}
