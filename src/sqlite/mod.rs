//! `SQLite` driver: rusqlite connections pooled by bb8.
//!
//! - config: the bb8 manager and driver constructor
//! - connection: [`Connection`](crate::connection::Connection) over rusqlite
//! - params / query: value conversion in both directions

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::{SqliteManager, sqlite_driver};
pub use connection::{SharedSqliteConnection, SqliteConnection};
pub use params::Params as SqliteParams;
pub use query::build_result_set;
