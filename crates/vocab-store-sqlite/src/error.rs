//! Error type for `vocab-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] vocab_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("cannot decode stored value: {0}")]
  Decode(String),

  /// The stored rows no longer hash to the checksum written with them.
  #[error("table {table:?} is corrupt: checksum {actual} does not match recorded {expected}")]
  Corrupt {
    table:    String,
    expected: String,
    actual:   String,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
