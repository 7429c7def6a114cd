//! The append-only audit log.
//!
//! Every change to a record's schedule, calculation version or renewal date
//! is an [`AuditLogEntry`]. Entries are never updated or deleted; the current
//! state of a record is folded from them (see [`crate::record`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{
  Error, Result,
  engine::Timestamp,
  record::Precondition,
  schedule::{CalculationVersion, RecurrenceSchedule},
};

/// Prefix written at the start of every rollback reason. Kept for human
/// readers of the log; rollbacks are identified by [`AuditAction::Rollback`].
pub const ROLLBACK_PREFIX: &str = "ROLLBACK: ";

// ─── Action ──────────────────────────────────────────────────────────────────

/// What kind of change an entry records.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
  /// Genesis entry written when the record is created.
  Created,
  /// The schedule was edited; the renewal date was reconciled.
  ScheduleChanged,
  /// A user explicitly set a future renewal date.
  RenewalOverridden,
  /// Promotion from version 1 to version 2.
  Migrate,
  /// Demotion from version 2 back to version 1.
  Rollback,
  /// Reporting only: the two versions disagree by more than the threshold.
  SignificantDifference,
}

impl AuditAction {
  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownAction(s.to_owned()))
  }

  pub fn as_str(self) -> &'static str { self.into() }

  /// Whether applying this entry changes the folded record state.
  pub fn changes_state(self) -> bool { !matches!(self, Self::SignificantDifference) }

  /// Whether this entry belongs to the version-transition audit trail, as
  /// opposed to ordinary record lifecycle.
  pub fn is_version_audit(self) -> bool {
    matches!(
      self,
      Self::Migrate | Self::Rollback | Self::SignificantDifference
    )
  }
}

// ─── Entries ─────────────────────────────────────────────────────────────────

/// An immutable record of one change (or one reported divergence).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
  pub entry_id:         Uuid,
  pub record_id:        Uuid,
  pub action:           AuditAction,
  /// The schedule in force after this entry.
  pub schedule:         RecurrenceSchedule,
  pub old_version:      CalculationVersion,
  pub new_version:      CalculationVersion,
  pub old_renewal_date: Option<Timestamp>,
  pub new_renewal_date: Option<Timestamp>,
  pub reason:           String,
  /// Server-assigned; never changes after creation.
  pub migrated_at:      DateTime<Utc>,
}

/// Input to [`crate::store::RecordStore::append_entry`].
///
/// `entry_id` and `migrated_at` are assigned by the store. For
/// state-changing actions the store rejects the append unless the record
/// still matches `expect`; reports ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
  pub record_id:        Uuid,
  pub action:           AuditAction,
  pub schedule:         RecurrenceSchedule,
  pub old_version:      CalculationVersion,
  pub new_version:      CalculationVersion,
  pub old_renewal_date: Option<Timestamp>,
  pub new_renewal_date: Option<Timestamp>,
  pub reason:           String,
  pub expect:           Precondition,
}

/// Aggregate counts reported by [`crate::migration::MigrationManager::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStats {
  pub v1_count:            usize,
  pub v2_count:            usize,
  /// Migrate, rollback and significant-difference entries.
  pub total_audit_entries: usize,
  pub rollback_count:      usize,
  /// Created, schedule-change and override entries.
  pub lifecycle_entries:   usize,
  /// Stored records whose history could not be folded.
  pub unreadable_count:    usize,
}
