//! Composable transaction programs interpreted against pooled SQL connections.
//!
//! Build a [`Transaction`](program::Transaction) out of queries, record operations, events and
//! awaited futures, then hand it to a [`ConnectionManager`](manager::ConnectionManager). The
//! manager runs it inside one database transaction on one pooled connection: committed and
//! followed by its events on success, rolled back with its events dropped on failure.
//!
//! ```rust,no_run
//! use sql_transactional::prelude::*;
//!
//! # async fn demo() -> TxResult<()> {
//! let manager = DriverRegistry::with_builtin()
//!     .create_manager("sqlite", ManagerOptions::new("app.db"))
//!     .await?;
//!
//! let program = Transaction::read("users", 1)
//!     .maybe_skip()
//!     .and_then(|user| {
//!         let mut user = user.as_record().cloned().unwrap_or_default();
//!         user.set("visits", 1);
//!         Transaction::update("users", user)
//!     })
//!     .then(Transaction::emit("user_visited", serde_json::json!({ "id": 1 })));
//!
//! manager.run(program).await?;
//! manager.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod interpreter;
pub mod logging;
pub mod manager;
pub mod mapper;
pub mod pool;
pub mod prelude;
pub mod program;
pub mod record;
pub mod registry;
pub mod results;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

pub use error::{TxError, TxResult};
