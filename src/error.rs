use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type TxResult<T> = Result<T, TxError>;

#[derive(Debug, Error)]
pub enum TxError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    PoolError(String),

    /// Raised by a pooled connection after it has been closed. No driver call is made.
    #[error("Cannot use closed pooled connection")]
    ClosedConnection,

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Failure declared by the transaction program itself.
    #[error("Transaction aborted: {0}")]
    Aborted(String),

    #[error("Async dependency failed: {0}")]
    AsyncFailure(String),

    #[error("Transaction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected value: {0}")]
    UnexpectedValue(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for TxError {
    fn from(err: serde_json::Error) -> Self {
        TxError::ParameterError(format!("JSON serialization error: {err}"))
    }
}

impl From<tokio::task::JoinError> for TxError {
    fn from(err: tokio::task::JoinError) -> Self {
        TxError::ExecutionError(format!("blocking task join error: {err}"))
    }
}
