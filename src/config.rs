use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TxError, TxResult};

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout_ms() -> u64 {
    30_000
}

/// Options handed to a driver factory when building a connection manager.
///
/// Deserializable, so it can come straight from a config file:
/// ```rust
/// use sql_transactional::prelude::*;
///
/// let opts = ManagerOptions::from_json(r#"{"target": "app.db", "max_connections": 4}"#).unwrap();
/// assert_eq!(opts.max_connections, 4);
/// assert_eq!(opts.connection_timeout_ms, 30_000);
/// assert!(opts.transaction_timeout().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerOptions {
    /// Driver-specific target: a file path for `SQLite`, a label for the memory driver.
    pub target: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a checkout may wait for a free connection.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Deadline for a whole transaction run; none by default.
    #[serde(default)]
    pub transaction_timeout_ms: Option<u64>,
}

impl ManagerOptions {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            max_connections: default_max_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            transaction_timeout_ms: None,
        }
    }

    #[must_use]
    pub fn builder(target: impl Into<String>) -> ManagerOptionsBuilder {
        ManagerOptionsBuilder::new(target)
    }

    /// Parse options from JSON.
    ///
    /// # Errors
    /// Returns `TxError::ConfigError` if the JSON is malformed or the options are invalid.
    pub fn from_json(json: &str) -> TxResult<Self> {
        let opts: Self = serde_json::from_str(json)
            .map_err(|e| TxError::ConfigError(format!("invalid manager options: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    /// # Errors
    /// Returns `TxError::ConfigError` if the pool would have no capacity.
    pub fn validate(&self) -> TxResult<()> {
        if self.max_connections == 0 {
            return Err(TxError::ConfigError(
                "max_connections must be at least 1".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    #[must_use]
    pub fn transaction_timeout(&self) -> Option<Duration> {
        self.transaction_timeout_ms.map(Duration::from_millis)
    }
}

/// Fluent builder for [`ManagerOptions`].
#[derive(Debug, Clone)]
pub struct ManagerOptionsBuilder {
    opts: ManagerOptions,
}

impl ManagerOptionsBuilder {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            opts: ManagerOptions::new(target),
        }
    }

    #[must_use]
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.opts.max_connections = max_connections;
        self
    }

    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.opts.connection_timeout_ms = duration_ms(timeout);
        self
    }

    #[must_use]
    pub fn transaction_timeout(mut self, timeout: Duration) -> Self {
        self.opts.transaction_timeout_ms = Some(duration_ms(timeout));
        self
    }

    #[must_use]
    pub fn finish(self) -> ManagerOptions {
        self.opts
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_timeouts() {
        let opts = ManagerOptions::builder("db")
            .max_connections(2)
            .connection_timeout(Duration::from_secs(1))
            .transaction_timeout(Duration::from_millis(250))
            .finish();
        assert_eq!(opts.max_connections, 2);
        assert_eq!(opts.connection_timeout(), Duration::from_secs(1));
        assert_eq!(opts.transaction_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = ManagerOptions::from_json(r#"{"target": "db", "max_connections": 0}"#);
        assert!(matches!(err, Err(TxError::ConfigError(_))));
        assert!(matches!(
            ManagerOptions::from_json("not json"),
            Err(TxError::ConfigError(_))
        ));
    }
}
