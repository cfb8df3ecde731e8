//! SQLite storage for the Livros service.
//!
//! A [`Database`] wraps a bounded sqlx pool. Handlers take one pooled
//! [`Connection`] per request; dropping it hands the slot back to the pool, so
//! a request releases its connection on every exit path.

pub mod error;
pub mod migrate;
pub mod pool;

pub use error::DbError;
pub use pool::{Connection, Database, PoolOptions};

/// Primary key type shared by every table.
pub type RecordId = i64;
