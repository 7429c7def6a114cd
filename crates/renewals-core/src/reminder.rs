//! Renewal reminder arithmetic.
//!
//! Reminders themselves are delivered elsewhere; this module only answers
//! "how many days until renewal" and "is a reminder due for this date".

use chrono::TimeDelta;

use crate::engine::Timestamp;

/// Whole days until `renewal_date`: hours remaining divided by 24, rounded
/// down, never negative.
pub fn days_until(renewal_date: Timestamp, now: Timestamp) -> i64 {
  let remaining: TimeDelta = renewal_date.signed_duration_since(now);
  remaining.num_hours().div_euclid(24).max(0)
}

/// Whether a reminder should be sent now.
///
/// A reminder is due when the renewal lies in the future, within
/// `lead_days` whole days, and no reminder has already been sent for this
/// exact renewal date. `last_reminded_for` is the renewal date the previous
/// reminder was sent for, so moving the renewal date re-arms the reminder.
pub fn reminder_due(
  renewal_date: Option<Timestamp>,
  last_reminded_for: Option<Timestamp>,
  lead_days: i64,
  now: Timestamp,
) -> bool {
  let Some(renewal_date) = renewal_date else {
    return false;
  };
  renewal_date > now
    && days_until(renewal_date, now) <= lead_days
    && last_reminded_for != Some(renewal_date)
}

#[cfg(test)]
mod tests {
  use chrono::DateTime;

  use super::*;

  fn ts(s: &str) -> Timestamp { DateTime::parse_from_rfc3339(s).unwrap() }

  #[test]
  fn days_until_rounds_down_whole_days() {
    let now = ts("2025-10-01T12:00:00Z");
    assert_eq!(days_until(ts("2025-10-04T11:00:00Z"), now), 2);
    assert_eq!(days_until(ts("2025-10-04T12:00:00Z"), now), 3);
    assert_eq!(days_until(ts("2025-10-01T23:00:00Z"), now), 0);
  }

  #[test]
  fn days_until_is_never_negative() {
    let now = ts("2025-10-01T12:00:00Z");
    assert_eq!(days_until(ts("2025-09-20T12:00:00Z"), now), 0);
  }

  #[test]
  fn days_until_respects_offsets() {
    let now = ts("2025-10-01T00:00:00Z");
    // 2025-10-03T00:00+02:00 is 2025-10-02T22:00Z: 46 hours away.
    assert_eq!(days_until(ts("2025-10-03T00:00:00+02:00"), now), 1);
  }

  #[test]
  fn reminder_fires_once_per_renewal_date() {
    let now = ts("2025-10-01T09:00:00Z");
    let renewal = ts("2025-10-03T09:00:00Z");

    assert!(reminder_due(Some(renewal), None, 3, now));
    assert!(!reminder_due(Some(renewal), Some(renewal), 3, now));

    // A new renewal date re-arms the reminder.
    let moved = ts("2025-10-02T09:00:00Z");
    assert!(reminder_due(Some(moved), Some(renewal), 3, now));
  }

  #[test]
  fn reminder_waits_for_the_lead_window() {
    let now = ts("2025-10-01T09:00:00Z");
    assert!(!reminder_due(Some(ts("2025-10-10T09:00:00Z")), None, 3, now));
    assert!(!reminder_due(Some(ts("2025-09-30T09:00:00Z")), None, 3, now));
    assert!(!reminder_due(None, None, 3, now));
  }
}
