//! The `RecordStore` trait.
//!
//! Implemented by storage backends (e.g. `renewals-store-sqlite`). The
//! service and migration manager depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  audit::{AuditAction, AuditLogEntry, NewAuditEntry},
  record::{BillingRecord, NewRecord, RecordStatus},
  schedule::CalculationVersion,
};

/// A record that was left out of an operation, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
  /// The id as stored. It is text because the id itself may be malformed.
  pub record_id: String,
  pub error:     String,
}

/// Result of [`RecordStore::list_records`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordListing {
  pub records:    Vec<BillingRecord>,
  /// Stored records whose history could not be decoded or folded. They
  /// are listed whatever version filter was asked for.
  pub unreadable: Vec<SkippedRecord>,
}

/// Abstraction over a billing-record store.
///
/// Audit entries are append-only, and each append is one atomic unit: the
/// entry is either fully written (and reflected in the folded record) or not
/// at all. Appends for the same record are serialised by the backend.
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Records ───────────────────────────────────────────────────────────

  /// Persist a new record together with its `Created` genesis entry.
  /// `input.renewal_date` is stored as given.
  fn insert_record(
    &self,
    input: NewRecord,
  ) -> impl Future<Output = Result<BillingRecord, Self::Error>> + Send + '_;

  /// Retrieve and fold a record. Returns `None` if not found.
  fn get_record(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<BillingRecord>, Self::Error>> + Send + '_;

  /// List all records, optionally only those on one calculation version.
  /// A malformed record never fails the listing; it is reported in
  /// [`RecordListing::unreadable`] instead.
  fn list_records(
    &self,
    version: Option<CalculationVersion>,
  ) -> impl Future<Output = Result<RecordListing, Self::Error>> + Send + '_;

  /// Ordinary field edit; never touches the renewal date.
  fn set_status(
    &self,
    id: Uuid,
    status: RecordStatus,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Audit log ─────────────────────────────────────────────────────────

  /// Append one entry atomically.
  ///
  /// For state-changing actions the append is rejected with a conflict if
  /// the record's revision or status no longer match `entry.expect`.
  fn append_entry(
    &self,
    entry: NewAuditEntry,
  ) -> impl Future<Output = Result<AuditLogEntry, Self::Error>> + Send + '_;

  /// All entries for one record, in append order.
  fn entries_for(
    &self,
    record_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AuditLogEntry>, Self::Error>> + Send + '_;

  /// The most recent entry for `record_id` with the given action.
  fn latest_entry(
    &self,
    record_id: Uuid,
    action: AuditAction,
  ) -> impl Future<Output = Result<Option<AuditLogEntry>, Self::Error>> + Send + '_;

  /// Number of entries per action across the whole log.
  fn count_entries(
    &self,
  ) -> impl Future<Output = Result<Vec<(AuditAction, usize)>, Self::Error>> + Send + '_;
}
