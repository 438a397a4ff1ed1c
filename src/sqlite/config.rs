use std::future::Future;
use std::time::Duration;

use bb8::ManageConnection;

use super::connection::SqliteConnection;
use crate::config::ManagerOptions;
use crate::connection::Connection;
use crate::error::{TxError, TxResult};
use crate::pool::Bb8Driver;

/// How long a connection waits on a locked database before failing with `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// bb8 manager opening `SQLite` connections on one database file.
///
/// Every connection is opened in WAL mode with a busy timeout so concurrent pooled connections
/// can read while one writes.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    path: String,
}

impl SqliteManager {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

fn open(path: &str) -> TxResult<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    // journal_mode reports the resulting mode as a row.
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    Ok(conn)
}

impl ManageConnection for SqliteManager {
    type Connection = SqliteConnection;
    type Error = TxError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let path = self.path.clone();
        async move {
            let conn = tokio::task::spawn_blocking(move || open(&path)).await??;
            Ok(SqliteConnection::new(conn))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.connect().await }
    }

    /// A connection that ended, or whose transaction could not be closed, is not reused.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_terminated() || conn.in_transaction()
    }
}

/// Build a pooled `SQLite` driver for the database file named by `options.target`.
///
/// # Errors
/// Returns `TxError::ConfigError` for invalid options, or the error from opening the first
/// connection.
pub async fn sqlite_driver(options: &ManagerOptions) -> TxResult<Bb8Driver<SqliteManager>> {
    let manager = SqliteManager::new(options.target.clone());
    // Open once up front so a bad path fails here rather than on first checkout.
    let mut probe = manager.connect().await?;
    probe.close().await;
    Bb8Driver::build(manager, options).await
}
