use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionStatus, StatementOutcome, StatusSignal};
use crate::error::{TxError, TxResult};
use crate::types::{RowValues, StatementHandle, StatementKind};

/// Receives the base connection when a pooled connection ends. Called at most once.
pub type ReleaseFn = Box<dyn FnOnce(Box<dyn Connection>) + Send>;

struct Shared {
    base: Mutex<Option<Box<dyn Connection>>>,
    closed: AtomicBool,
    in_transaction: AtomicBool,
    statements: std::sync::Mutex<Vec<StatementHandle>>,
    release: std::sync::Mutex<Option<ReleaseFn>>,
    status: StatusSignal,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Lock the base connection for one operation, failing if the wrapper is closed.
    async fn lock_open(&self) -> TxResult<MutexGuard<'_, Option<Box<dyn Connection>>>> {
        if self.is_closed() {
            return Err(TxError::ClosedConnection);
        }
        let guard = self.base.lock().await;
        // A status-driven close may have started while we waited for the lock.
        if self.is_closed() || guard.is_none() {
            return Err(TxError::ClosedConnection);
        }
        Ok(guard)
    }

    fn remember(&self, statement: StatementHandle) {
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(statement);
    }

    fn forget(&self, statement: &StatementHandle) {
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| s.id() != statement.id());
    }

    fn take_statements(&self) -> Vec<StatementHandle> {
        std::mem::take(&mut *self.statements.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn release(&self, base: Box<dyn Connection>) {
        let release = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(release) = release {
            release(base);
        }
    }

    /// End the pooled connection once. `Closed` is an explicit close and tidies the base
    /// connection before release; a terminal status from the base skips the tidy-up.
    async fn shutdown(&self, status: ConnectionStatus) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let base = self.base.lock().await.take();
        let statements = self.take_statements();
        self.status.finish(status);

        let Some(mut base) = base else {
            return;
        };
        if status == ConnectionStatus::Closed {
            if self.in_transaction.swap(false, Ordering::AcqRel) {
                if let Err(err) = base.rollback().await {
                    warn!(error = %err, "rollback of open transaction on close failed");
                }
            }
            for statement in &statements {
                base.destroy(statement);
            }
        } else {
            debug!(?status, "base connection ended; releasing pooled connection");
        }
        self.release(base);
    }

    /// Synchronous close used when dropped outside a tokio runtime. No rollback or statement
    /// cleanup can run here; the base is released as is, or left to drop with `Shared` when an
    /// operation still holds it.
    fn shutdown_now(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.take_statements();
        self.status.finish(ConnectionStatus::Closed);
        let base = match self.base.try_lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(base) = base {
            self.release(base);
        }
    }
}

/// A connection checked out of a pool.
///
/// Closing it does not close the underlying connection: the base connection is handed to the
/// release listener given at construction (normally "return to pool"). Release happens exactly
/// once, on whichever comes first of [`Connection::close`], termination of the base connection,
/// or drop. After that every operation fails with [`TxError::ClosedConnection`] and the base
/// connection is never touched again.
///
/// A failed rollback keeps the transaction marked open, so an explicit close tries once more
/// before release. Dropping the wrapper outside a tokio runtime cannot await anything: the base
/// connection is released without rollback or statement cleanup, and the driver has to notice
/// an open transaction itself (the `SQLite` manager discards such connections).
pub struct PooledConnection {
    shared: Arc<Shared>,
}

impl PooledConnection {
    /// Wrap `base`. When called inside a tokio runtime, a watcher task releases the connection
    /// if the base connection's status stream ends first.
    #[must_use]
    pub fn new(base: Box<dyn Connection>, release: ReleaseFn) -> Self {
        let base_status = base.status();
        let shared = Arc::new(Shared {
            base: Mutex::new(Some(base)),
            closed: AtomicBool::new(false),
            in_transaction: AtomicBool::new(false),
            statements: std::sync::Mutex::new(Vec::new()),
            release: std::sync::Mutex::new(Some(release)),
            status: StatusSignal::new(),
        });

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(watch_base(
                base_status,
                shared.status.subscribe(),
                Arc::downgrade(&shared),
            ));
        }
        Self { shared }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Number of statements prepared through this wrapper and not yet destroyed.
    #[must_use]
    pub fn prepared_statements(&self) -> usize {
        self.shared
            .statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

async fn watch_base(
    mut base_status: watch::Receiver<ConnectionStatus>,
    mut own_status: watch::Receiver<ConnectionStatus>,
    shared: Weak<Shared>,
) {
    let base_ended = async move {
        base_status
            .wait_for(|s| s.is_terminal())
            .await
            .map(|s| *s)
            .unwrap_or(ConnectionStatus::Failed)
    };
    let own_ended = async move {
        let _ = own_status.wait_for(|s| s.is_terminal()).await;
    };

    tokio::select! {
        status = base_ended => {
            if let Some(shared) = shared.upgrade() {
                shared.shutdown(status).await;
            }
        }
        () = own_ended => {}
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("closed", &self.is_closed())
            .field("prepared_statements", &self.prepared_statements())
            .field("status", &self.shared.status.current())
            .finish()
    }
}

#[async_trait]
impl Connection for PooledConnection {
    async fn connect(&mut self) -> TxResult<()> {
        let mut guard = self.shared.lock_open().await?;
        let base = guard.as_mut().ok_or(TxError::ClosedConnection)?;
        base.connect().await
    }

    async fn begin_transaction(&mut self) -> TxResult<()> {
        let mut guard = self.shared.lock_open().await?;
        let base = guard.as_mut().ok_or(TxError::ClosedConnection)?;
        base.begin_transaction().await?;
        self.shared.in_transaction.store(true, Ordering::Release);
        Ok(())
    }

    async fn commit(&mut self) -> TxResult<()> {
        let mut guard = self.shared.lock_open().await?;
        let base = guard.as_mut().ok_or(TxError::ClosedConnection)?;
        base.commit().await?;
        self.shared.in_transaction.store(false, Ordering::Release);
        Ok(())
    }

    async fn rollback(&mut self) -> TxResult<()> {
        let mut guard = self.shared.lock_open().await?;
        let base = guard.as_mut().ok_or(TxError::ClosedConnection)?;
        base.rollback().await?;
        self.shared.in_transaction.store(false, Ordering::Release);
        Ok(())
    }

    async fn prepare(&mut self, sql: &str, kind: StatementKind) -> TxResult<StatementHandle> {
        let mut guard = self.shared.lock_open().await?;
        let base = guard.as_mut().ok_or(TxError::ClosedConnection)?;
        let statement = base.prepare(sql, kind).await?;
        self.shared.remember(statement.clone());
        Ok(statement)
    }

    async fn execute(
        &mut self,
        statement: &StatementHandle,
        bindings: &[RowValues],
    ) -> TxResult<StatementOutcome> {
        let mut guard = self.shared.lock_open().await?;
        let base = guard.as_mut().ok_or(TxError::ClosedConnection)?;
        base.execute(statement, bindings).await
    }

    fn destroy(&mut self, statement: &StatementHandle) {
        self.shared.forget(statement);
        if self.shared.is_closed() {
            return;
        }
        if let Ok(mut guard) = self.shared.base.try_lock() {
            if let Some(base) = guard.as_mut() {
                base.destroy(statement);
            }
        }
    }

    fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    async fn close(&mut self) {
        self.shared.shutdown(ConnectionStatus::Closed).await;
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.shared.is_closed() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(&self.shared);
                handle.spawn(async move {
                    shared.shutdown(ConnectionStatus::Closed).await;
                });
            }
            Err(_) => self.shared.shutdown_now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::test_utils::{Call, MemoryBackend};

    fn counting_release(count: &Arc<AtomicUsize>) -> ReleaseFn {
        let count = Arc::clone(count);
        Box::new(move |_conn| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn close_is_idempotent_and_releases_once() {
        let backend = MemoryBackend::new();
        let released = Arc::new(AtomicUsize::new(0));
        let mut conn = PooledConnection::new(
            Box::new(backend.connection()),
            counting_release(&released),
        );

        conn.close().await;
        conn.close().await;

        assert!(conn.is_closed());
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(*conn.status().borrow(), ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn operations_after_close_do_not_reach_the_base() {
        let backend = MemoryBackend::new();
        let released = Arc::new(AtomicUsize::new(0));
        let mut conn = PooledConnection::new(
            Box::new(backend.connection()),
            counting_release(&released),
        );
        conn.close().await;
        let calls_before = backend.journal().len();

        assert!(matches!(
            conn.begin_transaction().await,
            Err(TxError::ClosedConnection)
        ));
        assert!(matches!(
            conn.prepare("SELECT 1", StatementKind::Select).await,
            Err(TxError::ClosedConnection)
        ));
        assert!(matches!(conn.commit().await, Err(TxError::ClosedConnection)));
        assert_eq!(backend.journal().len(), calls_before);
    }

    #[tokio::test]
    async fn close_destroys_outstanding_statements_and_rolls_back() {
        let backend = MemoryBackend::new();
        let released = Arc::new(AtomicUsize::new(0));
        let mut conn = PooledConnection::new(
            Box::new(backend.connection()),
            counting_release(&released),
        );
        conn.begin_transaction().await.unwrap();
        let kept = conn.prepare("SELECT 1", StatementKind::Select).await.unwrap();
        let dropped = conn.prepare("SELECT 2", StatementKind::Select).await.unwrap();
        conn.destroy(&dropped);
        assert_eq!(conn.prepared_statements(), 1);

        conn.close().await;

        let journal = backend.journal();
        assert!(journal.contains(&Call::Rollback(1)));
        assert!(journal.contains(&Call::Destroy(1, kept.sql().to_string())));
        assert_eq!(backend.rollbacks(), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_rollback_is_retried_on_close() {
        let backend = MemoryBackend::new();
        let released = Arc::new(AtomicUsize::new(0));
        let mut conn = PooledConnection::new(
            Box::new(backend.connection()),
            counting_release(&released),
        );
        conn.begin_transaction().await.unwrap();
        backend.fail_rollback("connection reset");
        assert!(conn.rollback().await.is_err());

        backend.clear_failures();
        conn.close().await;

        assert_eq!(backend.rollbacks(), 2);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_outside_a_runtime_releases_without_tidy_up() {
        let backend = MemoryBackend::new();
        let released = Arc::new(AtomicUsize::new(0));
        let mut conn = PooledConnection::new(
            Box::new(backend.connection()),
            counting_release(&released),
        );
        let status = conn.status();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(async {
            conn.begin_transaction().await.unwrap();
            conn.prepare("SELECT 1", StatementKind::Select).await.unwrap();
        });

        drop(conn);

        assert_eq!(*status.borrow(), ConnectionStatus::Closed);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(backend.rollbacks(), 0);
        assert!(!backend.journal().iter().any(|c| matches!(c, Call::Destroy(..))));
    }

    #[tokio::test]
    async fn base_termination_releases_once() {
        let backend = MemoryBackend::new();
        let released = Arc::new(AtomicUsize::new(0));
        let mut conn = PooledConnection::new(
            Box::new(backend.connection()),
            counting_release(&released),
        );
        let mut status = conn.status();

        backend.terminate_all();
        let seen = *status.wait_for(|s| s.is_terminal()).await.unwrap();
        assert_eq!(seen, ConnectionStatus::Failed);

        conn.close().await;
        assert!(conn.is_closed());
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(backend.rollbacks(), 0);
    }

    #[tokio::test]
    async fn dropping_an_open_connection_releases_it() {
        let backend = MemoryBackend::new();
        let released = Arc::new(AtomicUsize::new(0));
        let conn = PooledConnection::new(
            Box::new(backend.connection()),
            counting_release(&released),
        );
        let mut status = conn.status();
        drop(conn);

        let seen = *status.wait_for(|s| s.is_terminal()).await.unwrap();
        assert_eq!(seen, ConnectionStatus::Closed);
        // The spawned close finishes the status before releasing; give it a moment.
        for _ in 0..50 {
            if released.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
