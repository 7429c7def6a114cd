//! Recurrence schedules and the calculation versions that interpret them.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{Error, Result};

// ─── Schedule ────────────────────────────────────────────────────────────────

/// The unit a billing record recurs on.
///
/// A closed set: strings outside it are rejected at construction time rather
/// than being mapped onto some default spacing.
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
pub enum RecurrenceSchedule {
  Daily,
  Weekly,
  Monthly,
  Quarterly,
  Annual,
}

/// The length of one schedule period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
  /// An exact number of days; never ambiguous.
  Days(u32),
  /// A number of calendar months; ambiguous at month ends.
  Months(u32),
}

impl Period {
  /// The period repeated `n` times.
  pub fn times(self, n: u32) -> Self {
    match self {
      Self::Days(d) => Self::Days(d.saturating_mul(n)),
      Self::Months(m) => Self::Months(m.saturating_mul(n)),
    }
  }
}

impl RecurrenceSchedule {
  /// Parse a stored or user-supplied schedule name.
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s.trim()).map_err(|_| Error::UnknownSchedule(s.to_owned()))
  }

  /// The canonical lowercase name, as stored.
  pub fn as_str(self) -> &'static str { self.into() }

  pub fn period(self) -> Period {
    match self {
      Self::Daily => Period::Days(1),
      Self::Weekly => Period::Days(7),
      Self::Monthly => Period::Months(1),
      Self::Quarterly => Period::Months(3),
      Self::Annual => Period::Months(12),
    }
  }
}

// ─── Calculation version ─────────────────────────────────────────────────────

/// Which month-end policy computes a record's renewal date.
///
/// Only `1` and `2` are legal on the wire; any other integer is an error.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub enum CalculationVersion {
  /// Naive calendar add: day-of-month overflow spills into the next month.
  #[default]
  Legacy,
  /// Anniversary-preserving: overflow clamps to the last day of the month.
  Anniversary,
}

impl CalculationVersion {
  pub fn as_i64(self) -> i64 {
    match self {
      Self::Legacy => 1,
      Self::Anniversary => 2,
    }
  }
}

impl TryFrom<i64> for CalculationVersion {
  type Error = Error;

  fn try_from(v: i64) -> Result<Self> {
    match v {
      1 => Ok(Self::Legacy),
      2 => Ok(Self::Anniversary),
      other => Err(Error::InvalidVersion(other)),
    }
  }
}

impl From<CalculationVersion> for i64 {
  fn from(v: CalculationVersion) -> Self { v.as_i64() }
}

impl std::fmt::Display for CalculationVersion {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "v{}", self.as_i64())
  }
}
