//! Everyday record operations: create, schedule edits, explicit overrides and
//! status changes.
//!
//! Only three things ever move a renewal date: a schedule change, a version
//! change (see [`crate::migration`]) and an explicit user override. Every
//! other edit goes through [`RecordService::set_status`] and leaves it alone.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  audit::{AuditAction, AuditLogEntry, NewAuditEntry},
  clock::{Clock, SystemClock},
  engine::{Timestamp, next_occurrence},
  reconcile::reconcile_schedule,
  record::{BillingRecord, NewRecord, RecordStatus},
  schedule::RecurrenceSchedule,
  store::{RecordListing, RecordStore},
};

pub struct RecordService<S, C = SystemClock> {
  store: Arc<S>,
  clock: C,
}

impl<S: RecordStore> RecordService<S> {
  pub fn new(store: Arc<S>) -> Self { Self::with_clock(store, SystemClock) }
}

impl<S: RecordStore, C: Clock> RecordService<S, C> {
  pub fn with_clock(store: Arc<S>, clock: C) -> Self { Self { store, clock } }

  /// Create a record. Active records without an explicit renewal date get
  /// one from the engine, anchored on `anchor_date` or on now.
  pub async fn create(&self, mut input: NewRecord) -> Result<BillingRecord> {
    if input.status.is_active() && input.renewal_date.is_none() {
      input.renewal_date = Some(next_occurrence(
        input.anchor_date,
        input.schedule,
        input.calculation_version,
        self.clock.now(),
      )?);
    }

    let record = self.store.insert_record(input).await.map_err(Error::store)?;
    info!(
      record_id = %record.record_id,
      schedule = %record.schedule,
      version = %record.calculation_version,
      "record created"
    );
    Ok(record)
  }

  /// Fetch a record, failing if it does not exist.
  pub async fn get(&self, id: Uuid) -> Result<BillingRecord> {
    self
      .store
      .get_record(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::RecordNotFound(id))
  }

  /// Every readable record, plus the ones whose history could not be read.
  pub async fn list(&self) -> Result<RecordListing> {
    let listing = self.store.list_records(None).await.map_err(Error::store)?;
    for skipped in &listing.unreadable {
      warn!(record_id = %skipped.record_id, error = %skipped.error, "unreadable record");
    }
    Ok(listing)
  }

  /// Move a record onto a new schedule, reconciling its renewal date from
  /// the original anchor. Unchanged schedules are a no-op.
  pub async fn change_schedule(
    &self,
    id: Uuid,
    schedule: RecurrenceSchedule,
  ) -> Result<BillingRecord> {
    let record = self.get(id).await?;
    let Some(entry) = reconcile_schedule(&record, schedule, self.clock.now())? else {
      debug!(record_id = %id, "schedule unchanged; renewal date left alone");
      return Ok(record);
    };

    let entry = self.append(entry).await?;
    info!(
      record_id = %id,
      schedule = %schedule,
      renewal_date = ?entry.new_renewal_date,
      "schedule changed"
    );
    self.get(id).await
  }

  /// Explicitly set the next renewal date. The date must be in the future.
  pub async fn override_renewal(
    &self,
    id: Uuid,
    renewal_date: Timestamp,
    reason: impl Into<String>,
  ) -> Result<BillingRecord> {
    if renewal_date <= self.clock.now() {
      return Err(Error::RenewalNotInFuture);
    }

    let record = self.get(id).await?;
    self
      .append(NewAuditEntry {
        record_id: id,
        action: AuditAction::RenewalOverridden,
        schedule: record.schedule,
        old_version: record.calculation_version,
        new_version: record.calculation_version,
        old_renewal_date: record.renewal_date,
        new_renewal_date: Some(renewal_date),
        reason: reason.into(),
        expect: record.precondition(),
      })
      .await?;
    info!(record_id = %id, %renewal_date, "renewal date overridden");
    self.get(id).await
  }

  /// Change the billing status. Never touches the renewal date.
  pub async fn set_status(&self, id: Uuid, status: RecordStatus) -> Result<BillingRecord> {
    self.get(id).await?;
    self.store.set_status(id, status).await.map_err(Error::store)?;
    self.get(id).await
  }

  /// Every audit entry for a record, oldest first.
  pub async fn history(&self, id: Uuid) -> Result<Vec<AuditLogEntry>> {
    self.get(id).await?;
    self.store.entries_for(id).await.map_err(Error::store)
  }

  async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
    self.store.append_entry(entry).await.map_err(Error::store)
  }
}
