//! Error types for `renewals-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown recurrence schedule: {0:?}")]
  UnknownSchedule(String),

  #[error("unknown record status: {0:?}")]
  UnknownStatus(String),

  #[error("unknown audit action: {0:?}")]
  UnknownAction(String),

  #[error("invalid calculation version: {0} (expected 1 or 2)")]
  InvalidVersion(i64),

  #[error("record not found: {0}")]
  RecordNotFound(Uuid),

  #[error("record {0} has no creation entry in its audit log")]
  MissingGenesis(Uuid),

  #[error("date arithmetic left the representable range")]
  DateOutOfRange,

  #[error("renewal override must lie in the future")]
  RenewalNotInFuture,

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error raised by a [`crate::store::RecordStore`].
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
