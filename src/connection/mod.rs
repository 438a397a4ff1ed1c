//! The driver-facing connection contract.
//!
//! Driver adapters implement [`Connection`]; everything above it (pooled wrapper, logging
//! decorator, interpreter) only talks to `dyn Connection`.

mod status;

pub use status::{ConnectionStatus, StatusSignal};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::TxResult;
use crate::results::ResultSet;
use crate::types::{RowValues, StatementHandle, StatementKind};

/// What executing a bound statement produced, according to its [`StatementKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    /// Select-like statements.
    Rows(ResultSet),
    /// Insert-like statements: the generated identifier.
    Inserted(i64),
    /// Everything else: rows affected.
    Affected(usize),
}

/// A physical (or decorated) database connection.
///
/// Operations are issued one at a time by the owner; implementations do not need to support
/// concurrent calls.
#[async_trait]
pub trait Connection: Send {
    /// Open (or verify) the link to the database.
    async fn connect(&mut self) -> TxResult<()>;

    async fn begin_transaction(&mut self) -> TxResult<()>;

    async fn commit(&mut self) -> TxResult<()>;

    async fn rollback(&mut self) -> TxResult<()>;

    /// Prepare `sql`; the returned handle carries the explicit statement kind.
    async fn prepare(&mut self, sql: &str, kind: StatementKind) -> TxResult<StatementHandle>;

    /// Execute a statement prepared on this connection with positional bindings.
    async fn execute(
        &mut self,
        statement: &StatementHandle,
        bindings: &[RowValues],
    ) -> TxResult<StatementOutcome>;

    /// Release server-side resources held by a prepared statement.
    fn destroy(&mut self, statement: &StatementHandle);

    /// Stream that reaches a terminal [`ConnectionStatus`] exactly once when the connection ends,
    /// by any cause.
    fn status(&self) -> watch::Receiver<ConnectionStatus>;

    async fn close(&mut self);
}
