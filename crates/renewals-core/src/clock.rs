//! Sources of "now".
//!
//! The engine never reads the system time itself; services and the
//! migration manager ask a [`Clock`], which tests replace with a fixed one.

use chrono::Utc;

use crate::engine::Timestamp;

pub trait Clock: Send + Sync {
  fn now(&self) -> Timestamp;
}

/// The system clock, reported in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> Timestamp { Utc::now().fixed_offset() }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
  fn now(&self) -> Timestamp { self.0 }
}
