//! Column/value records used by the record-mapping operations.

use serde::{Deserialize, Serialize};

use crate::error::{TxError, TxResult};
use crate::types::RowValues;

/// Name of the primary-key column used by update, delete and read.
pub const ID_COLUMN: &str = "id";

/// An ordered set of column/value pairs.
///
/// Column order is kept as inserted because it drives the generated SQL.
///
/// ```rust
/// use sql_transactional::prelude::*;
///
/// let user = Record::new().with("name", "x").with("age", 30);
/// assert_eq!(user.columns().collect::<Vec<_>>(), vec!["name", "age"]);
/// assert!(user.id().is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, RowValues)>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Record::set`].
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column, replacing the value in place if the column already exists.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<RowValues>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&RowValues> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Value of the `id` column, if present.
    #[must_use]
    pub fn id(&self) -> Option<&RowValues> {
        self.get(ID_COLUMN)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &RowValues> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<RowValues>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.set(column, value);
        }
        record
    }
}

/// What a delete removes: a row id, or a record carrying one.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteTarget {
    Id(RowValues),
    Record(Record),
}

impl DeleteTarget {
    /// The id to bind in `WHERE id=?`.
    ///
    /// # Errors
    /// Returns `TxError::ParameterError` when the target is a record without an `id` column.
    pub fn id_value(&self) -> TxResult<RowValues> {
        match self {
            DeleteTarget::Id(id) => Ok(id.clone()),
            DeleteTarget::Record(record) => record.id().cloned().ok_or_else(|| {
                TxError::ParameterError("delete target record has no id column".into())
            }),
        }
    }
}

impl From<Record> for DeleteTarget {
    fn from(record: Record) -> Self {
        DeleteTarget::Record(record)
    }
}

impl From<RowValues> for DeleteTarget {
    fn from(id: RowValues) -> Self {
        DeleteTarget::Id(id)
    }
}

impl From<i64> for DeleteTarget {
    fn from(id: i64) -> Self {
        DeleteTarget::Id(RowValues::Int(id))
    }
}

impl From<i32> for DeleteTarget {
    fn from(id: i32) -> Self {
        DeleteTarget::Id(RowValues::from(id))
    }
}

impl From<&str> for DeleteTarget {
    fn from(id: &str) -> Self {
        DeleteTarget::Id(RowValues::from(id))
    }
}
