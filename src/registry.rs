//! Named driver factories.
//!
//! Applications pick a driver by name (often from the command line via
//! [`DatabaseType`](crate::types::DatabaseType)) and get back a ready [`ConnectionManager`].
//!
//! ```rust,no_run
//! use sql_transactional::prelude::*;
//!
//! # async fn demo() -> TxResult<()> {
//! let registry = DriverRegistry::with_builtin();
//! let manager = registry
//!     .create_manager("sqlite", ManagerOptions::new("app.db"))
//!     .await?;
//! manager.run(Transaction::query(StatementKind::Other, "CREATE TABLE t(id INTEGER)", vec![])).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::config::ManagerOptions;
use crate::error::{TxError, TxResult};
use crate::manager::ConnectionManager;
use crate::pool::PoolDriver;
use crate::types::BoxFuture;

/// Builds a pool driver from manager options.
pub type DriverFactory =
    Arc<dyn Fn(ManagerOptions) -> BoxFuture<'static, TxResult<Arc<dyn PoolDriver>>> + Send + Sync>;

/// Maps driver names to factories. An ordinary value: create one, register what you need, and
/// pass it where managers are built.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every driver compiled into this build.
    #[must_use]
    pub fn with_builtin() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "sqlite")]
        registry.register(crate::types::DatabaseType::Sqlite.name(), |opts| async move {
            let driver = crate::sqlite::sqlite_driver(&opts).await?;
            Ok::<_, TxError>(Arc::new(driver) as Arc<dyn PoolDriver>)
        });

        #[cfg(feature = "test-utils")]
        registry.register(crate::types::DatabaseType::Memory.name(), |opts| async move {
            let driver = crate::test_utils::MemoryDriver::new(
                crate::test_utils::MemoryBackend::new(),
                opts.max_connections,
            );
            Ok::<_, TxError>(Arc::new(driver) as Arc<dyn PoolDriver>)
        });

        registry
    }

    /// Register `factory` under `name`, replacing any previous factory with that name.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(ManagerOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TxResult<Arc<dyn PoolDriver>>> + Send + 'static,
    {
        let factory: DriverFactory = Arc::new(
            move |opts: ManagerOptions| -> BoxFuture<'static, TxResult<Arc<dyn PoolDriver>>> {
                Box::pin(factory(opts))
            },
        );
        self.factories.insert(name.into(), factory);
        self
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build a manager with the driver registered as `name`.
    ///
    /// # Errors
    /// Returns `TxError::ConfigError` for an unknown name or invalid options, or whatever the
    /// factory returns.
    pub async fn create_manager(
        &self,
        name: &str,
        options: ManagerOptions,
    ) -> TxResult<ConnectionManager> {
        options.validate()?;
        let factory = self.factories.get(name).ok_or_else(|| {
            TxError::ConfigError(format!(
                "unknown driver '{name}' (registered: {})",
                self.names().join(", ")
            ))
        })?;
        let timeout = options.transaction_timeout();
        let driver = factory(options).await?;

        let manager = ConnectionManager::new(driver);
        Ok(match timeout {
            Some(timeout) => manager.with_transaction_timeout(timeout),
            None => manager,
        })
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}
