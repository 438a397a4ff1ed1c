use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::backend::MemoryBackend;
use crate::connection::Connection;
use crate::error::{TxError, TxResult};
use crate::pool::PoolDriver;

/// [`PoolDriver`] over a [`MemoryBackend`], bounded to `max_connections` checkouts at a time.
///
/// Each checkout opens a fresh backend connection and holds a semaphore permit until the
/// connection is dropped, so capacity comes back exactly when the manager releases it.
#[derive(Debug)]
pub struct MemoryDriver {
    backend: MemoryBackend,
    permits: Arc<Semaphore>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl MemoryDriver {
    #[must_use]
    pub fn new(backend: MemoryBackend, max_connections: u32) -> Self {
        Self {
            backend,
            permits: Arc::new(Semaphore::new(max_connections as usize)),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }

    /// Checkouts so far.
    #[must_use]
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Connections handed back through [`PoolDriver::to_pool`] so far.
    #[must_use]
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Checkouts that could start right now without waiting.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl PoolDriver for MemoryDriver {
    async fn create(&self) -> TxResult<Box<dyn Connection>> {
        let mut conn = self.backend.connection();
        conn.connect().await?;
        Ok(Box::new(conn))
    }

    async fn from_pool(&self) -> TxResult<Box<dyn Connection>> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| TxError::PoolError("pool has been shut down".into()))?;
        let mut conn = self.backend.connection().with_permit(permit);
        conn.connect().await?;
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(conn))
    }

    fn to_pool(&self, connection: Box<dyn Connection>) {
        self.released.fetch_add(1, Ordering::SeqCst);
        drop(connection);
    }

    async fn shutdown(&self) {
        self.permits.close();
    }
}
