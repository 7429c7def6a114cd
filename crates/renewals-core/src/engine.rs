//! The recurrence date engine.
//!
//! Pure functions computing the next occurrence of a schedule from an anchor
//! date. Two month-end policies exist and both stay computable:
//!
//! - [`CalculationVersion::Legacy`] adds calendar months naively, letting a
//!   day-of-month that does not exist in the target month spill into the
//!   following month (Jan 31 + 1 month = Mar 3 in 2025). Past anchors are
//!   advanced one period at a time from the previous result, so the spill
//!   compounds (Jan 31 → Mar 3 → Apr 3).
//! - [`CalculationVersion::Anniversary`] clamps to the last day of the target
//!   month, and always counts whole periods from the original anchor, so the
//!   anniversary survives short months (Jan 31 → Feb 28 → Mar 31 → Apr 30).
//!
//! All results keep the anchor's UTC offset and are strictly after `now`.

use chrono::{DateTime, Datelike, Days, FixedOffset, Months, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  schedule::{CalculationVersion, Period, RecurrenceSchedule},
};

/// A calendar instant with an explicit UTC offset.
pub type Timestamp = DateTime<FixedOffset>;

const SECONDS_PER_DAY: i64 = 86_400;

// ─── Calendar arithmetic ─────────────────────────────────────────────────────

/// Add `period` to `t`, clamping day-of-month overflow to the month's end.
fn add_clamped(t: Timestamp, period: Period) -> Result<Timestamp> {
  match period {
    Period::Days(d) => t.checked_add_days(Days::new(u64::from(d))),
    Period::Months(m) => t.checked_add_months(Months::new(m)),
  }
  .ok_or(Error::DateOutOfRange)
}

/// Add `period` to `t`, spilling day-of-month overflow into the next month.
fn add_overflowing(t: Timestamp, period: Period) -> Result<Timestamp> {
  match period {
    Period::Days(_) => add_clamped(t, period),
    Period::Months(m) => {
      // Land on the 1st of the target month, then walk forward day by day.
      let spill = u64::from(t.day() - 1);
      t.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(m)))
        .and_then(|first| first.checked_add_days(Days::new(spill)))
        .ok_or(Error::DateOutOfRange)
    }
  }
}

/// Add one period to `t` under the given version's month-end policy.
pub fn add_period(
  t: Timestamp,
  schedule: RecurrenceSchedule,
  version: CalculationVersion,
) -> Result<Timestamp> {
  match version {
    CalculationVersion::Legacy => add_overflowing(t, schedule.period()),
    CalculationVersion::Anniversary => add_clamped(t, schedule.period()),
  }
}

/// Number of whole `days`-long periods that fit between `anchor` and `now`.
fn whole_day_periods(anchor: Timestamp, now: Timestamp, days: u32) -> u32 {
  let elapsed: TimeDelta = now.signed_duration_since(anchor);
  let span = i64::from(days.max(1)) * SECONDS_PER_DAY;
  u32::try_from(elapsed.num_seconds().max(0) / span).unwrap_or(u32::MAX)
}

// ─── Next occurrence ─────────────────────────────────────────────────────────

/// Compute the next occurrence of `schedule` strictly after `now`.
///
/// With no anchor, `now` is the anchor and the result is `now` plus one
/// period. An anchor at or before `now` is advanced until it passes `now`;
/// a future anchor still advances by exactly one period.
pub fn next_occurrence(
  anchor: Option<Timestamp>,
  schedule: RecurrenceSchedule,
  version: CalculationVersion,
  now: Timestamp,
) -> Result<Timestamp> {
  let Some(anchor) = anchor else {
    return add_period(now, schedule, version);
  };

  if let Period::Days(days) = schedule.period() {
    // Day periods have no month-end ambiguity; jump straight to the first
    // candidate that can be after `now` instead of stepping through history.
    let skip = whole_day_periods(anchor, now, days);
    let mut next = add_clamped(anchor, schedule.period().times(skip.saturating_add(1)))?;
    while next <= now {
      next = add_clamped(next, schedule.period())?;
    }
    return Ok(next);
  }

  match version {
    CalculationVersion::Legacy => {
      let mut next = add_overflowing(anchor, schedule.period())?;
      while next <= now {
        next = add_overflowing(next, schedule.period())?;
      }
      Ok(next)
    }
    CalculationVersion::Anniversary => {
      let mut n: u32 = 1;
      loop {
        let next = add_clamped(anchor, schedule.period().times(n))?;
        if next > now {
          return Ok(next);
        }
        n = n.checked_add(1).ok_or(Error::DateOutOfRange)?;
      }
    }
  }
}

// ─── Version comparison ──────────────────────────────────────────────────────

/// What each calculation version yields for the same inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionComparison {
  pub legacy:      Timestamp,
  pub anniversary: Timestamp,
}

impl VersionComparison {
  /// Run the engine once per version.
  pub fn compute(
    anchor: Option<Timestamp>,
    schedule: RecurrenceSchedule,
    now: Timestamp,
  ) -> Result<Self> {
    Ok(Self {
      legacy:      next_occurrence(anchor, schedule, CalculationVersion::Legacy, now)?,
      anniversary: next_occurrence(
        anchor,
        schedule,
        CalculationVersion::Anniversary,
        now,
      )?,
    })
  }

  /// Absolute distance between the two results.
  pub fn difference(&self) -> TimeDelta {
    let delta = self.anniversary.signed_duration_since(self.legacy);
    if delta < TimeDelta::zero() { -delta } else { delta }
  }

  pub fn diverges(&self) -> bool { self.legacy != self.anniversary }

  /// The result for a specific version.
  pub fn for_version(&self, version: CalculationVersion) -> Timestamp {
    match version {
      CalculationVersion::Legacy => self.legacy,
      CalculationVersion::Anniversary => self.anniversary,
    }
  }
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator;

  use super::*;
  use crate::schedule::RecurrenceSchedule::*;

  const V1: CalculationVersion = CalculationVersion::Legacy;
  const V2: CalculationVersion = CalculationVersion::Anniversary;

  fn ts(s: &str) -> Timestamp { DateTime::parse_from_rfc3339(s).unwrap() }

  fn day(s: &str) -> Timestamp { ts(&format!("{s}T00:00:00Z")) }

  #[test]
  fn legacy_month_end_spills_into_march() {
    let anchor = day("2025-01-31");
    let next = next_occurrence(Some(anchor), Monthly, V1, anchor).unwrap();
    assert_eq!(next, day("2025-03-03"));
  }

  #[test]
  fn legacy_chain_compounds_the_spill() {
    let anchor = day("2025-01-31");
    let next = next_occurrence(Some(anchor), Monthly, V1, day("2025-03-03")).unwrap();
    assert_eq!(next, day("2025-04-03"));
  }

  #[test]
  fn anniversary_clamps_and_recovers_month_end() {
    let anchor = day("2025-01-31");
    let mut now = anchor;
    let mut seen = Vec::new();
    for _ in 0..4 {
      now = next_occurrence(Some(anchor), Monthly, V2, now).unwrap();
      seen.push(now);
    }
    assert_eq!(seen, vec![
      day("2025-02-28"),
      day("2025-03-31"),
      day("2025-04-30"),
      day("2025-05-31"),
    ]);
  }

  #[test]
  fn anniversary_leap_day_returns_in_leap_years() {
    let anchor = day("2024-02-29");
    let mut now = anchor;
    let mut seen = Vec::new();
    for _ in 0..4 {
      now = next_occurrence(Some(anchor), Annual, V2, now).unwrap();
      seen.push(now);
    }
    assert_eq!(seen, vec![
      day("2025-02-28"),
      day("2026-02-28"),
      day("2027-02-28"),
      day("2028-02-29"),
    ]);
  }

  #[test]
  fn legacy_leap_day_spills_into_march() {
    let anchor = day("2024-02-29");
    let next = next_occurrence(Some(anchor), Annual, V1, anchor).unwrap();
    assert_eq!(next, day("2025-03-01"));
  }

  #[test]
  fn quarterly_month_end_clamps_to_april() {
    let anchor = day("2025-01-31");
    assert_eq!(
      next_occurrence(Some(anchor), Quarterly, V2, anchor).unwrap(),
      day("2025-04-30")
    );
    assert_eq!(
      next_occurrence(Some(anchor), Quarterly, V1, anchor).unwrap(),
      day("2025-05-01")
    );
  }

  #[test]
  fn result_is_strictly_after_now_even_on_exact_boundary() {
    let anchor = day("2025-01-15");
    // `now` lands exactly on the first occurrence.
    let now = day("2025-02-15");
    for version in [V1, V2] {
      let next = next_occurrence(Some(anchor), Monthly, version, now).unwrap();
      assert_eq!(next, day("2025-03-15"));
    }
  }

  #[test]
  fn every_schedule_and_anchor_lands_after_now() {
    let now = ts("2026-10-16T12:34:56Z");
    let anchors = [
      "2019-01-31T08:00:00Z",
      "2020-02-29T23:59:59Z",
      "2024-12-31T00:00:00+05:30",
      "2026-10-16T12:34:56Z",
      "2026-10-16T12:34:55Z",
      "2027-03-31T00:00:00-08:00",
    ];
    for anchor in anchors.map(ts) {
      for schedule in RecurrenceSchedule::iter() {
        for version in [V1, V2] {
          let next = next_occurrence(Some(anchor), schedule, version, now).unwrap();
          assert!(next > now, "{schedule} {version} from {anchor} gave {next}");
        }
      }
    }
  }

  #[test]
  fn past_daily_anchor_fast_forwards_to_tomorrow() {
    let anchor = ts("2001-03-04T09:30:00Z");
    let now = ts("2026-10-16T10:00:00Z");
    let next = next_occurrence(Some(anchor), Daily, V1, now).unwrap();
    assert_eq!(next, ts("2026-10-17T09:30:00Z"));

    let now = ts("2026-10-16T09:00:00Z");
    let next = next_occurrence(Some(anchor), Daily, V2, now).unwrap();
    assert_eq!(next, ts("2026-10-16T09:30:00Z"));
  }

  #[test]
  fn weekly_versions_always_agree() {
    let now = day("2026-10-16");
    let mut anchor = day("2024-01-01");
    while anchor < day("2024-04-01") {
      let cmp = VersionComparison::compute(Some(anchor), Weekly, now).unwrap();
      assert!(!cmp.diverges(), "weekly diverged for {anchor}");
      anchor = anchor + TimeDelta::days(1);
    }
  }

  #[test]
  fn versions_diverge_only_at_month_end_anchors() {
    let mut anchor = day("2025-01-01");
    while anchor < day("2025-02-01") {
      let cmp = VersionComparison::compute(Some(anchor), Monthly, anchor).unwrap();
      // Only days 29..=31 do not exist in February 2025.
      assert_eq!(cmp.diverges(), anchor.day() >= 29, "anchor {anchor}");
      anchor = anchor + TimeDelta::days(1);
    }
  }

  #[test]
  fn anniversary_never_invents_impossible_days() {
    let anchor = day("2023-08-31");
    let mut now = anchor;
    for _ in 0..36 {
      now = next_occurrence(Some(anchor), Monthly, V2, now).unwrap();
      let last_day = now
        .date_naive()
        .with_day(1)
        .and_then(|d| d.checked_add_months(Months::new(1)))
        .and_then(|d| d.pred_opt())
        .unwrap()
        .day();
      assert_eq!(now.day(), last_day);
    }
  }

  #[test]
  fn offset_and_time_of_day_are_preserved() {
    let anchor = ts("2025-01-31T18:45:00-05:00");
    let next = next_occurrence(Some(anchor), Monthly, V2, anchor).unwrap();
    assert_eq!(next.to_rfc3339(), "2025-02-28T18:45:00-05:00");
    assert_eq!(next.offset(), anchor.offset());
  }

  #[test]
  fn missing_anchor_means_one_period_from_now() {
    let now = ts("2025-01-31T10:00:00+02:00");
    assert_eq!(
      next_occurrence(None, Monthly, V1, now).unwrap(),
      ts("2025-03-03T10:00:00+02:00")
    );
    assert_eq!(
      next_occurrence(None, Monthly, V2, now).unwrap(),
      ts("2025-02-28T10:00:00+02:00")
    );
    assert_eq!(
      next_occurrence(None, Weekly, V2, now).unwrap(),
      ts("2025-02-07T10:00:00+02:00")
    );
  }

  #[test]
  fn future_anchor_advances_exactly_one_period() {
    let now = day("2025-01-01");
    let anchor = day("2025-06-10");
    assert_eq!(
      next_occurrence(Some(anchor), Annual, V2, now).unwrap(),
      day("2026-06-10")
    );
  }

  #[test]
  fn comparison_difference_is_absolute() {
    let anchor = day("2025-01-31");
    let cmp = VersionComparison::compute(Some(anchor), Monthly, anchor).unwrap();
    assert_eq!(cmp.difference(), TimeDelta::days(3));
    assert_eq!(cmp.for_version(V1), day("2025-03-03"));
    assert_eq!(cmp.for_version(V2), day("2025-02-28"));
  }
}
