//! Statement logging.
//!
//! [`logging_decorator`] wraps every connection a manager hands out in a [`LoggingConnection`],
//! which writes `BEGIN`, `COMMIT`, `ROLLBACK` and each executed statement (bindings substituted
//! inline) to a [`StatementLog`] before forwarding the call.
//!
//! ```rust
//! use std::sync::Arc;
//! use sql_transactional::prelude::*;
//!
//! let log = Arc::new(MemoryLog::new());
//! let decorator = logging_decorator(log.clone());
//! # let _ = decorator;
//! assert!(log.lines().is_empty());
//! ```

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::connection::{Connection, ConnectionStatus, StatementOutcome};
use crate::error::TxResult;
use crate::manager::Decorator;
use crate::types::{RowValues, StatementHandle, StatementKind};

/// Tracing target used by [`TracingLog`].
pub const STATEMENT_TARGET: &str = "sql_transactional::statements";

/// Destination for logged statements.
pub trait StatementLog: Send + Sync {
    fn write(&self, line: &str);
}

/// Writes each line as an `info` event under [`STATEMENT_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl StatementLog for TracingLog {
    fn write(&self, line: &str) {
        tracing::info!(target: STATEMENT_TARGET, "{line}");
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatementLog for MemoryLog {
    fn write(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

/// Appends each line to a file. Write errors are reported through `tracing` and otherwise
/// ignored.
#[derive(Debug, Clone)]
pub struct FileLog {
    path: PathBuf,
}

impl FileLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StatementLog for FileLog {
    fn write(&self, line: &str) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(err) = result {
            tracing::warn!(path = %self.path.display(), error = %err, "statement log write failed");
        }
    }
}

/// Writes to several logs.
#[derive(Default)]
pub struct MultiLog {
    logs: Vec<Arc<dyn StatementLog>>,
}

impl MultiLog {
    #[must_use]
    pub fn new(logs: Vec<Arc<dyn StatementLog>>) -> Self {
        Self { logs }
    }
}

impl StatementLog for MultiLog {
    fn write(&self, line: &str) {
        for log in &self.logs {
            log.write(line);
        }
    }
}

/// Substitute `bindings` for the `?` placeholders of `sql`, in order.
///
/// For display only: values are not escaped. Placeholders without a binding are kept.
#[must_use]
pub fn render_statement(sql: &str, bindings: &[RowValues]) -> String {
    let mut rendered = String::with_capacity(sql.len());
    let mut values = bindings.iter();
    for ch in sql.chars() {
        if ch == '?' {
            if let Some(value) = values.next() {
                let _ = write!(rendered, "{value}");
                continue;
            }
        }
        rendered.push(ch);
    }
    rendered
}

/// Connection decorator that logs before forwarding.
pub struct LoggingConnection {
    inner: Box<dyn Connection>,
    log: Arc<dyn StatementLog>,
}

impl LoggingConnection {
    #[must_use]
    pub fn new(inner: Box<dyn Connection>, log: Arc<dyn StatementLog>) -> Self {
        Self { inner, log }
    }
}

#[async_trait]
impl Connection for LoggingConnection {
    async fn connect(&mut self) -> TxResult<()> {
        self.inner.connect().await
    }

    async fn begin_transaction(&mut self) -> TxResult<()> {
        self.log.write("BEGIN");
        self.inner.begin_transaction().await
    }

    async fn commit(&mut self) -> TxResult<()> {
        self.log.write("COMMIT");
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> TxResult<()> {
        self.log.write("ROLLBACK");
        self.inner.rollback().await
    }

    async fn prepare(&mut self, sql: &str, kind: StatementKind) -> TxResult<StatementHandle> {
        self.inner.prepare(sql, kind).await
    }

    async fn execute(
        &mut self,
        statement: &StatementHandle,
        bindings: &[RowValues],
    ) -> TxResult<StatementOutcome> {
        self.log.write(&render_statement(statement.sql(), bindings));
        self.inner.execute(statement, bindings).await
    }

    fn destroy(&mut self, statement: &StatementHandle) {
        self.inner.destroy(statement);
    }

    fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status()
    }

    async fn close(&mut self) {
        self.inner.close().await;
    }
}

/// Manager decorator that wraps connections in a [`LoggingConnection`] writing to `log`.
pub fn logging_decorator(log: Arc<dyn StatementLog>) -> Decorator {
    Arc::new(move |conn: Box<dyn Connection>| -> Box<dyn Connection> {
        Box::new(LoggingConnection::new(conn, Arc::clone(&log)))
    })
}
