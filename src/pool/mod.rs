//! Pooled connections and the drivers that hand them out.
//!
//! [`PoolDriver`] is what a database adapter implements to plug into the
//! [`ConnectionManager`](crate::manager::ConnectionManager); [`Bb8Driver`] covers any adapter with
//! a `bb8` manager. Every connection the manager checks out is wrapped in a [`PooledConnection`],
//! which guarantees the connection goes back to its driver exactly once.

pub mod driver;
pub mod pooled;

pub use driver::{Bb8Driver, PoolDriver};
pub use pooled::{PooledConnection, ReleaseFn};
