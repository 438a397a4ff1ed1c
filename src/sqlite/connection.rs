use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::params_from_iter;
use tokio::sync::{Mutex, watch};
use tracing::warn;

use super::params::Params;
use super::query::build_result_set;
use crate::connection::{Connection, ConnectionStatus, StatementOutcome, StatusSignal};
use crate::error::{TxError, TxResult};
use crate::types::{RowValues, StatementHandle, StatementKind};

/// A rusqlite connection shared with blocking tasks.
pub type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// Run `func` against the connection on tokio's blocking pool.
pub(crate) async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> TxResult<R>
where
    F: FnOnce(&mut rusqlite::Connection) -> TxResult<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await?
}

/// [`Connection`] over a single rusqlite connection.
///
/// rusqlite is synchronous, so every call runs on the blocking pool. Prepared statements live
/// in rusqlite's statement cache; handles refer to them by SQL text.
pub struct SqliteConnection {
    conn: SharedSqliteConnection,
    statements: HashMap<u64, StatementHandle>,
    next_statement: u64,
    in_transaction: bool,
    status: StatusSignal,
}

impl SqliteConnection {
    #[must_use]
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            statements: HashMap::new(),
            next_statement: 1,
            in_transaction: false,
            status: StatusSignal::new(),
        }
    }

    pub(crate) fn conn_handle(&self) -> SharedSqliteConnection {
        Arc::clone(&self.conn)
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.status.current().is_terminal()
    }

    fn ensure_open(&self) -> TxResult<()> {
        if self.is_terminated() {
            Err(TxError::ConnectionError("sqlite connection is closed".into()))
        } else {
            Ok(())
        }
    }

    async fn batch(&self, sql: &'static str) -> TxResult<()> {
        self.ensure_open()?;
        run_blocking(self.conn_handle(), move |conn| {
            conn.execute_batch(sql).map_err(TxError::SqliteError)
        })
        .await
    }

    /// Run arbitrary code against the underlying rusqlite connection, e.g. to set up a schema.
    ///
    /// # Errors
    /// Returns `TxError::ConnectionError` if the connection is closed, or the closure's error.
    pub async fn with_connection<F, R>(&self, func: F) -> TxResult<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> TxResult<R> + Send + 'static,
        R: Send + 'static,
    {
        self.ensure_open()?;
        run_blocking(self.conn_handle(), func).await
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("statements", &self.statements.len())
            .field("in_transaction", &self.in_transaction)
            .field("status", &self.status.current())
            .finish()
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn connect(&mut self) -> TxResult<()> {
        self.ensure_open()?;
        run_blocking(self.conn_handle(), |conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn begin_transaction(&mut self) -> TxResult<()> {
        self.batch("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> TxResult<()> {
        self.batch("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> TxResult<()> {
        // Stays in a transaction when ROLLBACK fails; the pool treats that as broken.
        self.batch("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn prepare(&mut self, sql: &str, kind: StatementKind) -> TxResult<StatementHandle> {
        self.ensure_open()?;
        let owned = sql.to_string();
        run_blocking(self.conn_handle(), move |conn| {
            conn.prepare_cached(&owned)?;
            Ok(())
        })
        .await?;

        let handle = StatementHandle::new(self.next_statement, sql, kind);
        self.next_statement += 1;
        self.statements.insert(handle.id(), handle.clone());
        Ok(handle)
    }

    async fn execute(
        &mut self,
        statement: &StatementHandle,
        bindings: &[RowValues],
    ) -> TxResult<StatementOutcome> {
        self.ensure_open()?;
        if !self.statements.contains_key(&statement.id()) {
            return Err(TxError::ExecutionError(format!(
                "statement {} was not prepared on this connection",
                statement.id()
            )));
        }

        let params = Params::convert(bindings);
        let sql = statement.sql().to_string();
        let kind = statement.kind();
        run_blocking(self.conn_handle(), move |conn| {
            let conn: &rusqlite::Connection = conn;
            let mut stmt = conn.prepare_cached(&sql)?;
            match kind {
                StatementKind::Select => {
                    build_result_set(&mut stmt, params.as_values()).map(StatementOutcome::Rows)
                }
                StatementKind::Insert => {
                    stmt.execute(params_from_iter(params.as_values().iter()))?;
                    Ok(StatementOutcome::Inserted(conn.last_insert_rowid()))
                }
                StatementKind::Update | StatementKind::Delete | StatementKind::Other => {
                    let affected = stmt.execute(params_from_iter(params.as_values().iter()))?;
                    Ok(StatementOutcome::Affected(affected))
                }
            }
        })
        .await
    }

    fn destroy(&mut self, statement: &StatementHandle) {
        self.statements.remove(&statement.id());
    }

    fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    async fn close(&mut self) {
        self.statements.clear();
        if self.in_transaction {
            match self.batch("ROLLBACK").await {
                Ok(()) => self.in_transaction = false,
                Err(err) => warn!(error = %err, "rollback on close failed"),
            }
        }
        self.status.finish(ConnectionStatus::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_connection() -> SqliteConnection {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let conn = SqliteConnection::new(conn);
        conn.with_connection(|c| {
            c.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")?;
            Ok(())
        })
        .await
        .unwrap();
        conn
    }

    #[tokio::test]
    async fn statement_kind_decides_the_outcome() {
        let mut conn = memory_connection().await;

        let insert = conn
            .prepare("INSERT INTO t(name) VALUES(?)", StatementKind::Insert)
            .await
            .unwrap();
        let first = conn.execute(&insert, &[RowValues::from("a")]).await.unwrap();
        let second = conn.execute(&insert, &[RowValues::from("b")]).await.unwrap();
        assert_eq!(first, StatementOutcome::Inserted(1));
        assert_eq!(second, StatementOutcome::Inserted(2));

        let update = conn
            .prepare("UPDATE t SET name=?", StatementKind::Update)
            .await
            .unwrap();
        assert_eq!(
            conn.execute(&update, &[RowValues::from("c")]).await.unwrap(),
            StatementOutcome::Affected(2)
        );

        let select = conn
            .prepare("SELECT id, name FROM t ORDER BY id", StatementKind::Select)
            .await
            .unwrap();
        match conn.execute(&select, &[]).await.unwrap() {
            StatementOutcome::Rows(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows.results[1].get("name"), Some(&RowValues::from("c")));
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn destroyed_statements_cannot_be_executed() {
        let mut conn = memory_connection().await;
        let select = conn
            .prepare("SELECT 1", StatementKind::Select)
            .await
            .unwrap();
        conn.destroy(&select);
        assert!(matches!(
            conn.execute(&select, &[]).await,
            Err(TxError::ExecutionError(_))
        ));
    }

    #[tokio::test]
    async fn a_failed_rollback_leaves_the_transaction_flag_set() {
        let mut conn = memory_connection().await;
        conn.begin_transaction().await.unwrap();
        // End the transaction behind the connection's back so ROLLBACK has nothing to undo.
        conn.with_connection(|c| {
            c.execute_batch("ROLLBACK")?;
            Ok(())
        })
        .await
        .unwrap();

        assert!(conn.rollback().await.is_err());
        assert!(conn.in_transaction());

        let status = conn.status();
        conn.close().await;
        assert_eq!(*status.borrow(), ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn close_ends_the_status_stream() {
        let mut conn = memory_connection().await;
        let status = conn.status();
        conn.close().await;
        assert_eq!(*status.borrow(), ConnectionStatus::Closed);
        assert!(conn.begin_transaction().await.is_err());
    }
}
