use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Boxed, sendable future used at the object-safe seams of the crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Values that can be stored in a database row or used as statement bindings.
///
/// The same enum is used by every driver so program code never branches on driver types:
/// ```rust
/// use sql_transactional::prelude::*;
///
/// let bindings: Vec<RowValues> = vec![1.into(), "alice".into(), true.into()];
/// assert_eq!(bindings[1].as_text(), Some("alice"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(1) => Some(true),
            RowValues::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            RowValues::Timestamp(value) => Some(*value),
            RowValues::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

/// Renders the value the way it would appear inline in a statement log.
/// Display only; text is quoted but not escaped.
impl fmt::Display for RowValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValues::Int(i) => write!(f, "{i}"),
            RowValues::Float(v) => write!(f, "{v}"),
            RowValues::Text(s) => write!(f, "'{s}'"),
            RowValues::Bool(b) => write!(f, "{}", i64::from(*b)),
            RowValues::Timestamp(dt) => write!(f, "'{}'", dt.format("%F %T%.f")),
            RowValues::Null => f.write_str("NULL"),
            RowValues::JSON(json) => write!(f, "'{json}'"),
            RowValues::Blob(bytes) => write!(f, "<blob {} bytes>", bytes.len()),
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<NaiveDateTime> for RowValues {
    fn from(value: NaiveDateTime) -> Self {
        RowValues::Timestamp(value)
    }
}

impl From<JsonValue> for RowValues {
    fn from(value: JsonValue) -> Self {
        RowValues::JSON(value)
    }
}

impl From<Vec<u8>> for RowValues {
    fn from(value: Vec<u8>) -> Self {
        RowValues::Blob(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// What a statement produces when executed.
///
/// Supplied by the caller alongside the SQL text; drivers never guess it from the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    /// Row-returning statement; executes to `StatementOutcome::Rows`.
    Select,
    /// Executes to `StatementOutcome::Inserted` with the generated id.
    Insert,
    Update,
    Delete,
    /// DDL and anything else; executes to `StatementOutcome::Affected`.
    Other,
}

impl StatementKind {
    #[must_use]
    pub fn returns_rows(self) -> bool {
        matches!(self, StatementKind::Select)
    }
}

/// Handle to a statement prepared on a connection.
///
/// Handles are issued by [`Connection::prepare`](crate::connection::Connection::prepare) and are
/// only meaningful on the connection that issued them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementHandle {
    id: u64,
    sql: Arc<str>,
    kind: StatementKind,
}

impl StatementHandle {
    #[must_use]
    pub fn new(id: u64, sql: impl Into<Arc<str>>, kind: StatementKind) -> Self {
        Self {
            id,
            sql: sql.into(),
            kind,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn kind(&self) -> StatementKind {
        self.kind
    }
}

/// A query and its parameters bundled together
///
/// This type makes it easier to pass around a SQL query and its
/// parameters as a single unit.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAndParams {
    /// The SQL query string
    pub query: String,
    /// The parameters to be bound to the query
    pub params: Vec<RowValues>,
    /// What executing the query produces
    pub kind: StatementKind,
}

impl QueryAndParams {
    pub fn new(kind: StatementKind, query: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            query: query.into(),
            params,
            kind,
        }
    }

    pub fn new_without_params(kind: StatementKind, query: impl Into<String>) -> Self {
        Self::new(kind, query, Vec::new())
    }
}

/// Drivers compiled into this build.
///
/// [`DriverRegistry::with_builtin`](crate::registry::DriverRegistry::with_builtin) registers each
/// of them under [`DatabaseType::name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum DatabaseType {
    /// `SQLite` through rusqlite, pooled with bb8
    #[cfg(feature = "sqlite")]
    Sqlite,
    /// Scripted in-memory driver for tests
    #[cfg(feature = "test-utils")]
    Memory,
}

impl DatabaseType {
    /// Registry key of this driver.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => "sqlite",
            #[cfg(feature = "test-utils")]
            DatabaseType::Memory => "memory",
        }
    }
}
