//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Server-assigned timestamps are stored as RFC 3339 UTC strings. Anchor and
//! renewal dates are stored as RFC 3339 strings carrying their own offset, so
//! a restored date is identical to the one that was recorded. Versions are
//! stored as the integers 1 and 2. UUIDs are stored as hyphenated lowercase
//! strings.

use chrono::{DateTime, Utc};
use renewals_core::{
  audit::{AuditAction, AuditLogEntry},
  engine::Timestamp,
  record::{RecordHeader, RecordStatus},
  schedule::{CalculationVersion, RecurrenceSchedule},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Timestamp (offset preserved) ────────────────────────────────────────────

pub fn encode_ts(ts: Timestamp) -> String { ts.to_rfc3339() }

pub fn decode_ts(s: &str) -> Result<Timestamp> {
  DateTime::parse_from_rfc3339(s).map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_ts(s: Option<&str>) -> Result<Option<Timestamp>> {
  s.map(decode_ts).transpose()
}

// ─── Counts ──────────────────────────────────────────────────────────────────

pub fn decode_count(n: i64) -> Result<usize> {
  usize::try_from(n).map_err(|_| Error::InvalidCount(n))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Columns selected for every audit-log read, in [`RawEntry`] order.
pub const ENTRY_COLUMNS: &str = "entry_id, record_id, action, schedule, \
                                 old_version, new_version, old_renewal_date, \
                                 new_renewal_date, reason, migrated_at";

/// Raw values read directly from an `audit_log` row.
pub struct RawEntry {
  pub entry_id:         String,
  pub record_id:        String,
  pub action:           String,
  pub schedule:         String,
  pub old_version:      i64,
  pub new_version:      i64,
  pub old_renewal_date: Option<String>,
  pub new_renewal_date: Option<String>,
  pub reason:           String,
  pub migrated_at:      String,
}

impl RawEntry {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:         row.get(0)?,
      record_id:        row.get(1)?,
      action:           row.get(2)?,
      schedule:         row.get(3)?,
      old_version:      row.get(4)?,
      new_version:      row.get(5)?,
      old_renewal_date: row.get(6)?,
      new_renewal_date: row.get(7)?,
      reason:           row.get(8)?,
      migrated_at:      row.get(9)?,
    })
  }

  pub fn into_entry(self) -> Result<AuditLogEntry> {
    Ok(AuditLogEntry {
      entry_id:         decode_uuid(&self.entry_id)?,
      record_id:        decode_uuid(&self.record_id)?,
      action:           AuditAction::parse(&self.action)?,
      schedule:         RecurrenceSchedule::parse(&self.schedule)?,
      old_version:      CalculationVersion::try_from(self.old_version)?,
      new_version:      CalculationVersion::try_from(self.new_version)?,
      old_renewal_date: decode_opt_ts(self.old_renewal_date.as_deref())?,
      new_renewal_date: decode_opt_ts(self.new_renewal_date.as_deref())?,
      reason:           self.reason,
      migrated_at:      decode_dt(&self.migrated_at)?,
    })
  }
}

/// Columns selected for every `records` read, in [`RawHeader`] order.
pub const HEADER_COLUMNS: &str = "record_id, created_at, anchor_date, status";

/// Raw strings read directly from a `records` row.
pub struct RawHeader {
  pub record_id:   String,
  pub created_at:  String,
  pub anchor_date: Option<String>,
  pub status:      String,
}

impl RawHeader {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:   row.get(0)?,
      created_at:  row.get(1)?,
      anchor_date: row.get(2)?,
      status:      row.get(3)?,
    })
  }

  pub fn into_header(self) -> Result<RecordHeader> {
    Ok(RecordHeader {
      record_id:   decode_uuid(&self.record_id)?,
      created_at:  decode_dt(&self.created_at)?,
      anchor_date: decode_opt_ts(self.anchor_date.as_deref())?,
      status:      RecordStatus::parse(&self.status)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamp_keeps_its_offset() {
    let ts = decode_ts("2025-01-31T18:45:00-05:00").unwrap();
    assert_eq!(encode_ts(ts), "2025-01-31T18:45:00-05:00");
  }

  #[test]
  fn counts_must_not_be_negative() {
    assert_eq!(decode_count(3).unwrap(), 3);
    assert!(matches!(decode_count(-1), Err(Error::InvalidCount(-1))));
  }

  #[test]
  fn header_rejects_unknown_status() {
    let raw = RawHeader {
      record_id:   encode_uuid(Uuid::new_v4()),
      created_at:  encode_dt(Utc::now()),
      anchor_date: None,
      status:      "expired".into(),
    };
    assert!(matches!(raw.into_header(), Err(Error::Core(_))));
  }
}
