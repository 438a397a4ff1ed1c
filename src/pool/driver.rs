use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bb8::{ManageConnection, Pool};
use tokio::sync::watch;

use crate::config::ManagerOptions;
use crate::connection::{Connection, ConnectionStatus, StatementOutcome};
use crate::error::{TxError, TxResult};
use crate::types::{RowValues, StatementHandle, StatementKind};

/// Pool-level operations a driver adapter provides to the connection manager.
#[async_trait]
pub trait PoolDriver: Send + Sync {
    /// Open a new connection outside the pool. The caller owns it.
    async fn create(&self) -> TxResult<Box<dyn Connection>>;

    /// Check a connection out of the pool, waiting while the pool is at capacity.
    async fn from_pool(&self) -> TxResult<Box<dyn Connection>>;

    /// Give a connection obtained from [`PoolDriver::from_pool`] back to the pool.
    fn to_pool(&self, connection: Box<dyn Connection>);

    /// Close the pool. Later checkouts fail with `TxError::PoolError`.
    async fn shutdown(&self);
}

/// [`PoolDriver`] backed by a `bb8` pool.
///
/// Works for any bb8 manager whose connections implement [`Connection`]. Checked-out connections
/// return to the pool when [`PoolDriver::to_pool`] drops them; bb8 discards them instead if the
/// manager reports them broken.
pub struct Bb8Driver<M: ManageConnection> {
    manager: M,
    pool: Mutex<Option<Pool<M>>>,
}

impl<M> Bb8Driver<M>
where
    M: ManageConnection<Error = TxError> + Clone,
    M::Connection: Connection,
{
    /// Build the pool with the capacity and checkout timeout from `options`.
    ///
    /// # Errors
    /// Returns `TxError::ConfigError` for invalid options, or the manager's error if the pool
    /// cannot be built.
    pub async fn build(manager: M, options: &ManagerOptions) -> TxResult<Self> {
        options.validate()?;
        let pool = Pool::builder()
            .max_size(options.max_connections)
            .connection_timeout(options.connection_timeout())
            .build(manager.clone())
            .await?;
        Ok(Self {
            manager,
            pool: Mutex::new(Some(pool)),
        })
    }

    fn pool(&self) -> TxResult<Pool<M>> {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| TxError::PoolError("pool has been shut down".into()))
    }

    /// Connections currently held by the pool, idle or checked out.
    #[must_use]
    pub fn connections(&self) -> u32 {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |pool| pool.state().connections)
    }
}

impl<M: ManageConnection> fmt::Debug for Bb8Driver<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("Bb8Driver").field("open", &open).finish()
    }
}

#[async_trait]
impl<M> PoolDriver for Bb8Driver<M>
where
    M: ManageConnection<Error = TxError> + Clone,
    M::Connection: Connection,
{
    async fn create(&self) -> TxResult<Box<dyn Connection>> {
        let conn = self.manager.connect().await?;
        Ok(Box::new(conn))
    }

    async fn from_pool(&self) -> TxResult<Box<dyn Connection>> {
        let pool = self.pool()?;
        let conn = pool
            .get_owned()
            .await
            .map_err(|e| TxError::PoolError(format!("checkout failed: {e}")))?;
        Ok(Box::new(Bb8Connection { conn }))
    }

    fn to_pool(&self, connection: Box<dyn Connection>) {
        drop(connection);
    }

    async fn shutdown(&self) {
        let pool = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if pool.is_some() {
            tracing::debug!("bb8 pool shut down");
        }
    }
}

/// A bb8 checkout seen through the [`Connection`] trait.
struct Bb8Connection<M: ManageConnection> {
    conn: bb8::PooledConnection<'static, M>,
}

#[async_trait]
impl<M> Connection for Bb8Connection<M>
where
    M: ManageConnection,
    M::Connection: Connection,
{
    async fn connect(&mut self) -> TxResult<()> {
        self.conn.connect().await
    }

    async fn begin_transaction(&mut self) -> TxResult<()> {
        self.conn.begin_transaction().await
    }

    async fn commit(&mut self) -> TxResult<()> {
        self.conn.commit().await
    }

    async fn rollback(&mut self) -> TxResult<()> {
        self.conn.rollback().await
    }

    async fn prepare(&mut self, sql: &str, kind: StatementKind) -> TxResult<StatementHandle> {
        self.conn.prepare(sql, kind).await
    }

    async fn execute(
        &mut self,
        statement: &StatementHandle,
        bindings: &[RowValues],
    ) -> TxResult<StatementOutcome> {
        self.conn.execute(statement, bindings).await
    }

    fn destroy(&mut self, statement: &StatementHandle) {
        self.conn.destroy(statement);
    }

    fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.conn.status()
    }

    async fn close(&mut self) {
        self.conn.close().await;
    }
}
