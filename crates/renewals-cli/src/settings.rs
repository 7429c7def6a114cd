//! Runtime settings, read from an optional TOML file layered under
//! `RENEWALS_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::TimeDelta;
use renewals_core::{migration::DEFAULT_SIGNIFICANT_DIFFERENCE_DAYS, schedule::CalculationVersion};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// SQLite database file; a leading `~/` is expanded.
  pub store_path:                  PathBuf,
  /// Version divergence, in days, above which a batch run files a report.
  pub significant_difference_days: i64,
  /// Calculation version given to newly created records.
  pub default_version:             i64,
  /// How many whole days ahead of a renewal a reminder becomes due.
  pub reminder_lead_days:          i64,
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings: Self = config::Config::builder()
      .set_default("store_path", "renewals.db")?
      .set_default("significant_difference_days", DEFAULT_SIGNIFICANT_DIFFERENCE_DAYS)?
      .set_default("default_version", 1_i64)?
      .set_default("reminder_lead_days", 3_i64)?
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("RENEWALS"))
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise settings")?;

    // Reject bad versions at startup rather than on first use.
    settings.default_version()?;
    Ok(settings)
  }

  pub fn default_version(&self) -> anyhow::Result<CalculationVersion> {
    CalculationVersion::try_from(self.default_version).context("invalid default_version")
  }

  pub fn significant_difference(&self) -> TimeDelta {
    TimeDelta::days(self.significant_difference_days)
  }

  /// `store_path` with a leading `~` expanded to the user's home directory.
  pub fn store_path(&self) -> PathBuf {
    let s = self.store_path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/")
      && let Ok(home) = std::env::var("HOME")
    {
      return PathBuf::from(home).join(rest);
    }
    self.store_path.clone()
  }
}
