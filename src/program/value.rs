use serde_json::Value as JsonValue;

use crate::connection::StatementOutcome;
use crate::error::{TxError, TxResult};
use crate::record::Record;
use crate::results::ResultSet;
use crate::types::{RowValues, StatementHandle};

/// The value a program step hands to its continuation, and the final value of a run.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TxValue {
    /// No result (update, delete, emit).
    #[default]
    Unit,
    /// Generated identifier of an insert.
    Id(i64),
    /// Rows affected by a statement that returns no rows.
    Affected(usize),
    /// Rows of a select.
    Rows(ResultSet),
    /// Result of a read: the record, or nothing.
    Record(Option<Record>),
    /// A prepared statement.
    Statement(StatementHandle),
    /// A single scalar.
    Value(RowValues),
    /// Arbitrary structured data, typically from an awaited external value.
    Json(JsonValue),
}

impl TxValue {
    #[must_use]
    pub fn is_unit(&self) -> bool {
        matches!(self, TxValue::Unit)
    }

    /// `true` for a read that found nothing.
    #[must_use]
    pub fn is_nothing(&self) -> bool {
        matches!(self, TxValue::Record(None))
    }

    #[must_use]
    pub fn as_id(&self) -> Option<i64> {
        if let TxValue::Id(id) = self {
            Some(*id)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_affected(&self) -> Option<usize> {
        if let TxValue::Affected(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_rows(&self) -> Option<&ResultSet> {
        if let TxValue::Rows(rows) = self {
            Some(rows)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_record(&self) -> Option<&Record> {
        if let TxValue::Record(record) = self {
            record.as_ref()
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        if let TxValue::Json(json) = self {
            Some(json)
        } else {
            None
        }
    }

    /// # Errors
    /// Returns `TxError::UnexpectedValue` unless this is `TxValue::Id`.
    pub fn into_id(self) -> TxResult<i64> {
        match self {
            TxValue::Id(id) => Ok(id),
            other => Err(unexpected("an inserted id", &other)),
        }
    }

    /// # Errors
    /// Returns `TxError::UnexpectedValue` unless this is `TxValue::Rows`.
    pub fn into_rows(self) -> TxResult<ResultSet> {
        match self {
            TxValue::Rows(rows) => Ok(rows),
            other => Err(unexpected("rows", &other)),
        }
    }

    /// # Errors
    /// Returns `TxError::UnexpectedValue` unless this is `TxValue::Record`.
    pub fn into_record(self) -> TxResult<Option<Record>> {
        match self {
            TxValue::Record(record) => Ok(record),
            other => Err(unexpected("a read result", &other)),
        }
    }

    /// # Errors
    /// Returns `TxError::UnexpectedValue` unless this is `TxValue::Statement`.
    pub fn into_statement(self) -> TxResult<StatementHandle> {
        match self {
            TxValue::Statement(statement) => Ok(statement),
            other => Err(unexpected("a prepared statement", &other)),
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            TxValue::Unit => "unit",
            TxValue::Id(_) => "id",
            TxValue::Affected(_) => "affected count",
            TxValue::Rows(_) => "rows",
            TxValue::Record(_) => "record",
            TxValue::Statement(_) => "statement",
            TxValue::Value(_) => "scalar",
            TxValue::Json(_) => "json",
        }
    }
}

fn unexpected(wanted: &str, got: &TxValue) -> TxError {
    TxError::UnexpectedValue(format!("expected {wanted}, got {}", got.variant_name()))
}

impl From<StatementOutcome> for TxValue {
    fn from(outcome: StatementOutcome) -> Self {
        match outcome {
            StatementOutcome::Rows(rows) => TxValue::Rows(rows),
            StatementOutcome::Inserted(id) => TxValue::Id(id),
            StatementOutcome::Affected(n) => TxValue::Affected(n),
        }
    }
}

impl From<()> for TxValue {
    fn from((): ()) -> Self {
        TxValue::Unit
    }
}

impl From<Option<Record>> for TxValue {
    fn from(record: Option<Record>) -> Self {
        TxValue::Record(record)
    }
}

impl From<RowValues> for TxValue {
    fn from(value: RowValues) -> Self {
        TxValue::Value(value)
    }
}

impl From<JsonValue> for TxValue {
    fn from(json: JsonValue) -> Self {
        TxValue::Json(json)
    }
}

impl From<StatementHandle> for TxValue {
    fn from(statement: StatementHandle) -> Self {
        TxValue::Statement(statement)
    }
}
