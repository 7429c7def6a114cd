//! Error type for `renewals-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] renewals_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("record not found: {0}")]
  RecordNotFound(uuid::Uuid),

  #[error("negative row count: {0}")]
  InvalidCount(i64),

  /// The record's revision or status moved between read and append.
  #[error("record {0} was changed concurrently; reload and retry")]
  Conflict(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
