use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::connection::Connection;
use crate::error::{TxError, TxResult};
use crate::events::{EventSink, NoopSink};
use crate::interpreter::Interpreter;
use crate::pool::{PoolDriver, PooledConnection};
use crate::program::{Transaction, TxValue};

/// Wraps every connection the manager hands out, e.g.
/// [`logging_decorator`](crate::logging::logging_decorator).
pub type Decorator = Arc<dyn Fn(Box<dyn Connection>) -> Box<dyn Connection> + Send + Sync>;

/// Entry point for connections and transaction runs against one pool.
///
/// Cloning is cheap; clones share the pool and its closed state.
#[derive(Clone)]
pub struct ConnectionManager {
    driver: Arc<dyn PoolDriver>,
    decorator: Option<Decorator>,
    transaction_timeout: Option<Duration>,
    closed: Arc<AtomicBool>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(driver: Arc<dyn PoolDriver>) -> Self {
        Self {
            driver,
            decorator: None,
            transaction_timeout: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_decorator(mut self, decorator: Decorator) -> Self {
        self.decorator = Some(decorator);
        self
    }

    /// Deadline applied to every [`ConnectionManager::run_transaction`].
    #[must_use]
    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn transaction_timeout(&self) -> Option<Duration> {
        self.transaction_timeout
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> TxResult<()> {
        if self.is_closed() {
            Err(TxError::PoolError("connection manager is closed".into()))
        } else {
            Ok(())
        }
    }

    fn decorate(&self, conn: Box<dyn Connection>) -> Box<dyn Connection> {
        match &self.decorator {
            Some(decorator) => decorator(conn),
            None => conn,
        }
    }

    /// Open a connection outside the pool. The caller owns it and must close it.
    ///
    /// # Errors
    /// Returns `TxError::PoolError` after [`ConnectionManager::close`], or the driver's error.
    pub async fn create_connection(&self) -> TxResult<Box<dyn Connection>> {
        self.ensure_open()?;
        let conn = self.driver.create().await?;
        Ok(self.decorate(conn))
    }

    /// Check out a pooled connection. Closing it, dropping it, or the underlying connection
    /// ending returns it to the pool.
    ///
    /// # Errors
    /// Returns `TxError::PoolError` after [`ConnectionManager::close`], or the driver's error.
    pub async fn get_connection(&self) -> TxResult<Box<dyn Connection>> {
        self.ensure_open()?;
        let base = self.driver.from_pool().await?;
        debug!("connection checked out");

        let driver = Arc::clone(&self.driver);
        let pooled = PooledConnection::new(
            base,
            Box::new(move |conn: Box<dyn Connection>| {
                debug!("connection returned to pool");
                driver.to_pool(conn);
            }),
        );
        Ok(self.decorate(Box::new(pooled)))
    }

    /// Run `program` in a transaction, publishing its events to `sink` after commit.
    ///
    /// # Errors
    /// See [`Interpreter::run`].
    pub async fn run_transaction(
        &self,
        program: Transaction,
        sink: &dyn EventSink,
    ) -> TxResult<TxValue> {
        let interpreter = Interpreter::new(self, sink);
        match self.transaction_timeout {
            Some(timeout) => interpreter.with_timeout(timeout).run(program).await,
            None => interpreter.run(program).await,
        }
    }

    /// [`ConnectionManager::run_transaction`] discarding events.
    ///
    /// # Errors
    /// See [`Interpreter::run`].
    pub async fn run(&self, program: Transaction) -> TxResult<TxValue> {
        self.run_transaction(program, &NoopSink).await
    }

    /// Shut the pool down. Later calls on this manager, or any clone, fail with
    /// `TxError::PoolError`.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.driver.shutdown().await;
            debug!("connection manager closed");
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("decorated", &self.decorator.is_some())
            .field("transaction_timeout", &self.transaction_timeout)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
