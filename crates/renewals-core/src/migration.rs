//! Moving records between calculation versions.
//!
//! Transitions are explicit operator actions. Each promotion or rollback is
//! a single audit entry appended atomically, and the record's version and
//! renewal date are folded from the log, so there is no separate record
//! write that could get out of step with the history.

use std::sync::Arc;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  audit::{AuditAction, AuditLogEntry, MigrationStats, NewAuditEntry, ROLLBACK_PREFIX},
  clock::{Clock, SystemClock},
  engine::{Timestamp, VersionComparison, next_occurrence},
  record::BillingRecord,
  schedule::CalculationVersion,
  store::{RecordStore, SkippedRecord},
};

/// Divergence in days above which a batch run files a report.
pub const DEFAULT_SIGNIFICANT_DIFFERENCE_DAYS: i64 = 7;

/// Outcome of a single-record transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "entry", rename_all = "snake_case")]
pub enum Transition {
  /// The record moved; this is the entry that moved it.
  Applied(AuditLogEntry),
  /// The record was already on the target version.
  AlreadyCurrent,
}

/// Summary of a [`MigrationManager::batch_migrate`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
  pub dry_run:     bool,
  /// Version 1 records looked at, plus any stored record that could not be
  /// read.
  pub examined:    usize,
  /// Records whose versions differ by more than the threshold.
  pub significant: usize,
  pub migrated:    usize,
  /// Records that failed or could not be read, with the error.
  pub skipped:     Vec<SkippedRecord>,
}

pub struct MigrationManager<S, C = SystemClock> {
  store:     Arc<S>,
  clock:     C,
  threshold: TimeDelta,
}

impl<S: RecordStore> MigrationManager<S> {
  pub fn new(store: Arc<S>) -> Self { Self::with_clock(store, SystemClock) }
}

impl<S: RecordStore, C: Clock> MigrationManager<S, C> {
  pub fn with_clock(store: Arc<S>, clock: C) -> Self {
    Self {
      store,
      clock,
      threshold: TimeDelta::days(DEFAULT_SIGNIFICANT_DIFFERENCE_DAYS),
    }
  }

  /// Override the significant-difference threshold.
  pub fn with_threshold(mut self, threshold: TimeDelta) -> Self {
    self.threshold = threshold;
    self
  }

  // ── Compare ───────────────────────────────────────────────────────────

  /// What each version would compute for this record right now. Reads only.
  pub async fn compare(&self, id: Uuid) -> Result<VersionComparison> {
    let record = self.get(id).await?;
    VersionComparison::compute(record.anchor_date, record.schedule, self.clock.now())
  }

  // ── Migrate ───────────────────────────────────────────────────────────

  /// Promote one record to version 2. A no-op if it is already there.
  pub async fn migrate_one(&self, id: Uuid, reason: &str) -> Result<Transition> {
    let record = self.get(id).await?;
    self.migrate_record(&record, reason, self.clock.now()).await
  }

  async fn migrate_record(
    &self,
    record: &BillingRecord,
    reason: &str,
    now: Timestamp,
  ) -> Result<Transition> {
    if record.calculation_version == CalculationVersion::Anniversary {
      debug!(record_id = %record.record_id, "already on v2; nothing to migrate");
      return Ok(Transition::AlreadyCurrent);
    }

    let new_renewal_date =
      self.recompute(record, CalculationVersion::Anniversary, now)?;
    let entry = self
      .append(NewAuditEntry {
        record_id: record.record_id,
        action: AuditAction::Migrate,
        schedule: record.schedule,
        old_version: record.calculation_version,
        new_version: CalculationVersion::Anniversary,
        old_renewal_date: record.renewal_date,
        new_renewal_date,
        reason: reason.to_owned(),
        expect: record.precondition(),
      })
      .await?;

    info!(
      record_id = %record.record_id,
      old_renewal_date = ?entry.old_renewal_date,
      new_renewal_date = ?entry.new_renewal_date,
      "migrated to v2"
    );
    Ok(Transition::Applied(entry))
  }

  /// Walk every version 1 record. Divergences above the threshold are
  /// reported to the audit log even on a dry run; otherwise each record is
  /// migrated in its own atomic unit. A failing or unreadable record is
  /// logged and skipped, never fatal to the batch.
  pub async fn batch_migrate(&self, dry_run: bool, reason: &str) -> Result<BatchReport> {
    let listing = self
      .store
      .list_records(Some(CalculationVersion::Legacy))
      .await
      .map_err(Error::store)?;
    let now = self.clock.now();

    let mut report = BatchReport { dry_run, ..BatchReport::default() };
    for skipped in listing.unreadable {
      warn!(record_id = %skipped.record_id, error = %skipped.error, "skipping unreadable record");
      report.examined += 1;
      report.skipped.push(skipped);
    }
    for record in &listing.records {
      report.examined += 1;
      match self.batch_step(record, dry_run, reason, now).await {
        Ok((significant, migrated)) => {
          report.significant += usize::from(significant);
          report.migrated += usize::from(migrated);
        }
        Err(e) => {
          warn!(record_id = %record.record_id, error = %e, "skipping record in batch migration");
          report.skipped.push(SkippedRecord {
            record_id: record.record_id.to_string(),
            error:     e.to_string(),
          });
        }
      }
    }

    info!(
      dry_run,
      examined = report.examined,
      significant = report.significant,
      migrated = report.migrated,
      skipped = report.skipped.len(),
      "batch migration finished"
    );
    Ok(report)
  }

  async fn batch_step(
    &self,
    record: &BillingRecord,
    dry_run: bool,
    reason: &str,
    now: Timestamp,
  ) -> Result<(bool, bool)> {
    let cmp = VersionComparison::compute(record.anchor_date, record.schedule, now)?;
    let significant = cmp.difference() > self.threshold;

    if significant {
      warn!(
        record_id = %record.record_id,
        v1 = %cmp.legacy,
        v2 = %cmp.anniversary,
        days = cmp.difference().num_days(),
        "significant difference between versions"
      );
      self
        .append(NewAuditEntry {
          record_id: record.record_id,
          action: AuditAction::SignificantDifference,
          schedule: record.schedule,
          old_version: CalculationVersion::Legacy,
          new_version: CalculationVersion::Anniversary,
          old_renewal_date: Some(cmp.legacy),
          new_renewal_date: Some(cmp.anniversary),
          reason: format!(
            "significant difference of {} days: {reason}",
            cmp.difference().num_days()
          ),
          expect: record.precondition(),
        })
        .await?;
    }

    if dry_run {
      return Ok((significant, false));
    }
    let migrated = matches!(
      self.migrate_record(record, reason, now).await?,
      Transition::Applied(_)
    );
    Ok((significant, migrated))
  }

  // ── Rollback ──────────────────────────────────────────────────────────

  /// Return one record to version 1. A no-op if it is already there.
  ///
  /// The renewal date recorded just before the latest promotion is restored
  /// exactly. Only when no such date exists (or the schedule has changed
  /// since, making that date meaningless) is a fresh version 1 date computed.
  pub async fn rollback_one(&self, id: Uuid, reason: &str) -> Result<Transition> {
    let record = self.get(id).await?;
    if record.calculation_version == CalculationVersion::Legacy {
      debug!(record_id = %id, "already on v1; nothing to roll back");
      return Ok(Transition::AlreadyCurrent);
    }

    let promotion = self
      .store
      .latest_entry(id, AuditAction::Migrate)
      .await
      .map_err(Error::store)?;

    let restored = promotion
      .filter(|e| e.schedule == record.schedule)
      .and_then(|e| e.old_renewal_date);
    let new_renewal_date = match restored {
      Some(date) => Some(date),
      None => {
        debug!(record_id = %id, "no promotion to restore from; recomputing v1 date");
        self.recompute(&record, CalculationVersion::Legacy, self.clock.now())?
      }
    };

    let entry = self
      .append(NewAuditEntry {
        record_id: id,
        action: AuditAction::Rollback,
        schedule: record.schedule,
        old_version: record.calculation_version,
        new_version: CalculationVersion::Legacy,
        old_renewal_date: record.renewal_date,
        new_renewal_date,
        reason: format!("{ROLLBACK_PREFIX}{reason}"),
        expect: record.precondition(),
      })
      .await?;

    info!(
      record_id = %id,
      restored = restored.is_some(),
      new_renewal_date = ?entry.new_renewal_date,
      "rolled back to v1"
    );
    Ok(Transition::Applied(entry))
  }

  // ── Stats ─────────────────────────────────────────────────────────────

  pub async fn stats(&self) -> Result<MigrationStats> {
    let listing = self.store.list_records(None).await.map_err(Error::store)?;
    let counts = self.store.count_entries().await.map_err(Error::store)?;

    let mut stats = MigrationStats {
      unreadable_count: listing.unreadable.len(),
      ..MigrationStats::default()
    };
    for record in &listing.records {
      match record.calculation_version {
        CalculationVersion::Legacy => stats.v1_count += 1,
        CalculationVersion::Anniversary => stats.v2_count += 1,
      }
    }
    for (action, n) in counts {
      if action.is_version_audit() {
        stats.total_audit_entries += n;
      } else {
        stats.lifecycle_entries += n;
      }
      if action == AuditAction::Rollback {
        stats.rollback_count += n;
      }
    }
    Ok(stats)
  }

  // ── Helpers ───────────────────────────────────────────────────────────

  async fn get(&self, id: Uuid) -> Result<BillingRecord> {
    self
      .store
      .get_record(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::RecordNotFound(id))
  }

  async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
    self.store.append_entry(entry).await.map_err(Error::store)
  }

  /// The renewal date `record` gets under `version`. A version change always
  /// recomputes, whatever the record's status.
  fn recompute(
    &self,
    record: &BillingRecord,
    version: CalculationVersion,
    now: Timestamp,
  ) -> Result<Option<Timestamp>> {
    next_occurrence(record.anchor_date, record.schedule, version, now).map(Some)
  }
}
