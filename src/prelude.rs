//! Convenient imports for common functionality.
//!
//! This module re-exports the types most programs need to build and run transactions.

pub use crate::config::{ManagerOptions, ManagerOptionsBuilder};
pub use crate::connection::{Connection, ConnectionStatus, StatementOutcome, StatusSignal};
pub use crate::error::{TxError, TxResult};
pub use crate::events::{BufferedEvents, ChannelSink, EventSink, NoopSink, PublishedEvent};
pub use crate::interpreter::Interpreter;
pub use crate::logging::{
    FileLog, LoggingConnection, MemoryLog, MultiLog, StatementLog, TracingLog, logging_decorator,
    render_statement,
};
pub use crate::manager::{ConnectionManager, Decorator};
pub use crate::pool::{Bb8Driver, PoolDriver, PooledConnection};
pub use crate::program::{Operation, Transaction, TxValue};
pub use crate::record::{DeleteTarget, Record};
pub use crate::registry::DriverRegistry;
pub use crate::results::{ResultSet, Row};
pub use crate::types::{
    DatabaseType, QueryAndParams, RowValues, StatementHandle, StatementKind,
};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteConnection, SqliteManager, sqlite_driver};
