//! Schedule-change reconciliation.
//!
//! When a record moves to a new schedule its renewal date is recomputed from
//! the original anchor, never from the old renewal date, so the billing
//! anniversary (day-of-month, or day and month for annual) carries over.

use crate::{
  Result,
  audit::{AuditAction, NewAuditEntry},
  engine::{Timestamp, next_occurrence},
  record::BillingRecord,
  schedule::RecurrenceSchedule,
};

/// Plan the audit entry for moving `record` onto `schedule`.
///
/// Returns `None` when the schedule is unchanged: re-saving a record with
/// the same schedule must leave its renewal date exactly as it was. Records
/// that are not active keep their renewal date across the change.
pub fn reconcile_schedule(
  record: &BillingRecord,
  schedule: RecurrenceSchedule,
  now: Timestamp,
) -> Result<Option<NewAuditEntry>> {
  if record.schedule == schedule {
    return Ok(None);
  }

  let new_renewal_date = if record.status.is_active() {
    Some(next_occurrence(
      record.anchor_date,
      schedule,
      record.calculation_version,
      now,
    )?)
  } else {
    record.renewal_date
  };

  Ok(Some(NewAuditEntry {
    record_id: record.record_id,
    action: AuditAction::ScheduleChanged,
    schedule,
    old_version: record.calculation_version,
    new_version: record.calculation_version,
    old_renewal_date: record.renewal_date,
    new_renewal_date,
    reason: format!("schedule changed from {} to {schedule}", record.schedule),
    expect: record.precondition(),
  }))
}

#[cfg(test)]
mod tests {
  use chrono::{DateTime, Datelike, Utc};
  use uuid::Uuid;

  use super::*;
  use crate::{record::RecordStatus, schedule::CalculationVersion};

  fn ts(s: &str) -> Timestamp { DateTime::parse_from_rfc3339(s).unwrap() }

  fn record(schedule: RecurrenceSchedule, anchor: Option<&str>) -> BillingRecord {
    BillingRecord {
      record_id: Uuid::new_v4(),
      created_at: Utc::now(),
      anchor_date: anchor.map(ts),
      status: RecordStatus::Active,
      schedule,
      renewal_date: Some(ts("2025-11-15T00:00:00Z")),
      calculation_version: CalculationVersion::Legacy,
      revision: 1,
    }
  }

  #[test]
  fn unchanged_schedule_is_a_no_op() {
    let r = record(RecurrenceSchedule::Monthly, Some("2025-01-15T00:00:00Z"));
    let plan =
      reconcile_schedule(&r, RecurrenceSchedule::Monthly, ts("2025-10-20T00:00:00Z"))
        .unwrap();
    assert!(plan.is_none());
  }

  #[test]
  fn monthly_to_annual_keeps_the_day_of_month() {
    let r = record(RecurrenceSchedule::Monthly, Some("2025-01-15T00:00:00Z"));
    let plan =
      reconcile_schedule(&r, RecurrenceSchedule::Annual, ts("2025-10-20T00:00:00Z"))
        .unwrap()
        .unwrap();
    let renewal = plan.new_renewal_date.unwrap();
    assert_eq!(renewal, ts("2026-01-15T00:00:00Z"));
    assert_eq!(plan.old_renewal_date, r.renewal_date);
    assert_eq!(plan.action, AuditAction::ScheduleChanged);
    assert_eq!(plan.schedule, RecurrenceSchedule::Annual);
    assert_eq!(plan.expect, r.precondition());
  }

  #[test]
  fn annual_to_monthly_keeps_the_day_of_month() {
    let r = record(RecurrenceSchedule::Annual, Some("2023-06-15T00:00:00Z"));
    let plan =
      reconcile_schedule(&r, RecurrenceSchedule::Monthly, ts("2025-10-20T00:00:00Z"))
        .unwrap()
        .unwrap();
    let renewal = plan.new_renewal_date.unwrap();
    assert_eq!(renewal.day(), 15);
    assert_eq!(renewal, ts("2025-11-15T00:00:00Z"));
  }

  #[test]
  fn missing_anchor_counts_from_now() {
    let r = record(RecurrenceSchedule::Monthly, None);
    let now = ts("2025-10-20T08:00:00Z");
    let plan = reconcile_schedule(&r, RecurrenceSchedule::Weekly, now)
      .unwrap()
      .unwrap();
    assert_eq!(plan.new_renewal_date, Some(ts("2025-10-27T08:00:00Z")));
  }

  #[test]
  fn inactive_record_keeps_its_renewal_date() {
    let mut r = record(RecurrenceSchedule::Monthly, Some("2025-01-15T00:00:00Z"));
    r.status = RecordStatus::Paused;
    let plan =
      reconcile_schedule(&r, RecurrenceSchedule::Annual, ts("2025-10-20T00:00:00Z"))
        .unwrap()
        .unwrap();
    assert_eq!(plan.new_renewal_date, r.renewal_date);
    assert_eq!(plan.schedule, RecurrenceSchedule::Annual);
  }
}
