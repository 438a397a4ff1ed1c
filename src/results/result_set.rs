use std::sync::Arc;

use super::row::Row;
use crate::record::Record;
use crate::types::RowValues;

/// Rows returned by a select-like statement
///
/// ```rust
/// use sql_transactional::prelude::*;
///
/// let rs = ResultSet::from_rows(
///     vec!["id".into(), "name".into()],
///     vec![vec![RowValues::Int(1), RowValues::Text("a".into())]],
/// );
/// assert_eq!(rs.len(), 1);
/// assert_eq!(rs.results[0].get("name"), Some(&RowValues::Text("a".into())));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<Row>,
    column_names: Arc<Vec<String>>,
}

impl ResultSet {
    /// Create an empty result set for the given columns.
    #[must_use]
    pub fn with_columns(column_names: Vec<String>) -> Self {
        Self {
            results: Vec::new(),
            column_names: Arc::new(column_names),
        }
    }

    /// Build a result set from column names and rows of values.
    #[must_use]
    pub fn from_rows(column_names: Vec<String>, rows: Vec<Vec<RowValues>>) -> Self {
        let mut result_set = Self::with_columns(column_names);
        for values in rows {
            result_set.add_row_values(values);
        }
        result_set
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Add a row, sharing this result set's column names.
    pub fn add_row_values(&mut self, values: Vec<RowValues>) {
        self.results
            .push(Row::new(Arc::clone(&self.column_names), values));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.results.first()
    }

    /// Convert every row into a [`Record`].
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.results.iter().map(Row::to_record).collect()
    }
}
