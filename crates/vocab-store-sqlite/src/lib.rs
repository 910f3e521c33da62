//! SQLite persistence for vocabulary tables.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Term rows are upserted, history rows
//! are only ever inserted.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_LEASE_TTL, SqliteStore};

#[cfg(test)]
mod tests;
