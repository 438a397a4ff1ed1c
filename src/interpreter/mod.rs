//! Execution of transaction programs.
//!
//! One run uses one pooled connection for its whole lifetime:
//! acquire, `BEGIN`, walk the program, then `COMMIT` and publish the buffered events, or
//! `ROLLBACK` and drop them. The connection is released on every path.

mod machine;

use std::time::Duration;

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{TxError, TxResult};
use crate::events::{BufferedEvents, EventSink};
use crate::manager::ConnectionManager;
use crate::program::{Transaction, TxValue};

/// Runs transaction programs on connections from a [`ConnectionManager`].
pub struct Interpreter<'a> {
    manager: &'a ConnectionManager,
    sink: &'a dyn EventSink,
    timeout: Option<Duration>,
}

impl<'a> Interpreter<'a> {
    #[must_use]
    pub fn new(manager: &'a ConnectionManager, sink: &'a dyn EventSink) -> Self {
        Self {
            manager,
            sink,
            timeout: None,
        }
    }

    /// Abort runs whose program phase takes longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Execute `program` inside one database transaction.
    ///
    /// On success the transaction is committed, the connection released, and the program's
    /// events published in emission order before the final value is returned. On failure the
    /// transaction is rolled back, the connection released, no events are published, and the
    /// error that stopped the program is returned; a rollback error is only logged.
    ///
    /// # Errors
    /// Acquisition and `BEGIN` errors, the program's own failure, `TxError::Timeout` when the
    /// deadline passes, or the `COMMIT` error.
    pub async fn run(&self, program: Transaction) -> TxResult<TxValue> {
        let mut conn = self.manager.get_connection().await?;
        if let Err(err) = conn.begin_transaction().await {
            debug!(error = %err, "begin failed; releasing connection");
            conn.close().await;
            return Err(err);
        }

        let mut events = BufferedEvents::new();
        let outcome = match self.timeout {
            Some(limit) => {
                tokio::time::timeout(limit, machine::run_program(conn.as_mut(), program, &mut events))
                    .await
                    .unwrap_or(Err(TxError::Timeout(limit)))
            }
            None => machine::run_program(conn.as_mut(), program, &mut events).await,
        };

        match outcome {
            Ok(value) => {
                if let Err(err) = conn.commit().await {
                    warn!(error = %err, "commit failed; rolling back");
                    rollback_quietly(conn.as_mut(), &err).await;
                    conn.close().await;
                    events.discard();
                    return Err(err);
                }
                conn.close().await;
                debug!(events = events.len(), "transaction committed");
                events.publish_to(self.sink);
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "transaction failed; rolling back");
                rollback_quietly(conn.as_mut(), &err).await;
                conn.close().await;
                events.discard();
                Err(err)
            }
        }
    }
}

async fn rollback_quietly(conn: &mut dyn Connection, cause: &TxError) {
    if let Err(err) = conn.rollback().await {
        warn!(error = %err, cause = %cause, "rollback failed");
    }
}
