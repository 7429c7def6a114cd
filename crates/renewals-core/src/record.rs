//! Billing records and the fold that materialises them.
//!
//! A record's stored row carries only identity, its anchor date and its
//! status. Schedule, calculation version and renewal date are derived from
//! the record's audit log, so there is no second copy of them to keep in
//! sync with the history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{
  Error, Result,
  audit::{AuditAction, AuditLogEntry},
  engine::Timestamp,
  schedule::{CalculationVersion, RecurrenceSchedule},
};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Billing status. Inactive records are created without a renewal date and
/// keep whatever date they have across schedule edits.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RecordStatus {
  Active,
  Cancelled,
  Paused,
  Trial,
}

impl RecordStatus {
  pub fn parse(s: &str) -> Result<Self> {
    s.trim().parse().map_err(|_| Error::UnknownStatus(s.to_owned()))
  }

  pub fn as_str(self) -> &'static str { self.into() }

  pub fn is_active(self) -> bool { matches!(self, Self::Active) }
}

// ─── Stored row ──────────────────────────────────────────────────────────────

/// The stored part of a record: identity, anchor and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
  pub record_id:   Uuid,
  pub created_at:  DateTime<Utc>,
  /// Historical start date; `None` means "now" was the anchor at creation.
  pub anchor_date: Option<Timestamp>,
  pub status:      RecordStatus,
}

// ─── Materialised record ─────────────────────────────────────────────────────

/// The date-relevant view of a subscription; never stored, always folded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingRecord {
  pub record_id:           Uuid,
  pub created_at:          DateTime<Utc>,
  pub anchor_date:         Option<Timestamp>,
  pub status:              RecordStatus,
  pub schedule:            RecurrenceSchedule,
  pub renewal_date:        Option<Timestamp>,
  pub calculation_version: CalculationVersion,
  /// Number of state-changing audit entries folded into this view.
  pub revision:            u64,
}

/// What a writer read before planning an append. The store refuses a
/// state-changing append when either value has since moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precondition {
  pub revision: u64,
  pub status:   RecordStatus,
}

impl BillingRecord {
  /// Replay `entries` (in append order) over `header`.
  ///
  /// Significant-difference entries are reports and leave state untouched.
  /// The first state-changing entry must be the `Created` genesis entry.
  pub fn fold(header: RecordHeader, entries: &[AuditLogEntry]) -> Result<Self> {
    let mut state = entries.iter().filter(|e| e.action.changes_state());

    let genesis = state
      .next()
      .filter(|e| e.action == AuditAction::Created)
      .ok_or(Error::MissingGenesis(header.record_id))?;

    let mut record = Self {
      record_id:           header.record_id,
      created_at:          header.created_at,
      anchor_date:         header.anchor_date,
      status:              header.status,
      schedule:            genesis.schedule,
      renewal_date:        genesis.new_renewal_date,
      calculation_version: genesis.new_version,
      revision:            1,
    };

    for entry in state {
      record.schedule = entry.schedule;
      record.calculation_version = entry.new_version;
      record.renewal_date = entry.new_renewal_date;
      record.revision += 1;
    }

    Ok(record)
  }

  /// The precondition for appending an entry planned from this view.
  pub fn precondition(&self) -> Precondition {
    Precondition { revision: self.revision, status: self.status }
  }
}

// ─── NewRecord ───────────────────────────────────────────────────────────────

/// Input to [`crate::service::RecordService::create`].
#[derive(Debug, Clone)]
pub struct NewRecord {
  pub schedule:            RecurrenceSchedule,
  pub status:              RecordStatus,
  pub anchor_date:         Option<Timestamp>,
  /// An explicit first renewal date. When absent on an active record, the
  /// engine computes one.
  pub renewal_date:        Option<Timestamp>,
  pub calculation_version: CalculationVersion,
}

impl NewRecord {
  /// An active record on `schedule` with every optional field unset.
  pub fn new(schedule: RecurrenceSchedule) -> Self {
    Self {
      schedule,
      status: RecordStatus::Active,
      anchor_date: None,
      renewal_date: None,
      calculation_version: CalculationVersion::default(),
    }
  }
}
