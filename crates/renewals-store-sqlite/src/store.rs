//! The SQLite implementation of [`RecordStore`].

use std::{collections::HashMap, path::Path};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use renewals_core::{
  audit::{AuditAction, AuditLogEntry, NewAuditEntry},
  record::{BillingRecord, NewRecord, Precondition, RecordHeader, RecordStatus},
  schedule::CalculationVersion,
  store::{RecordListing, RecordStore, SkippedRecord},
};

use crate::{
  Error, Result,
  encode::{
    ENTRY_COLUMNS, HEADER_COLUMNS, RawEntry, RawHeader, decode_count, encode_dt,
    encode_ts, encode_uuid,
  },
  schema::SCHEMA,
};

/// What happened inside an append transaction.
enum AppendOutcome {
  Appended,
  Missing,
  Conflict,
}

/// Encoded column values for one `audit_log` insert.
struct EntryRow {
  entry_id:         String,
  record_id:        String,
  action:           &'static str,
  schedule:         &'static str,
  old_version:      i64,
  new_version:      i64,
  old_renewal_date: Option<String>,
  new_renewal_date: Option<String>,
  reason:           String,
  migrated_at:      String,
}

impl EntryRow {
  fn new(entry: &AuditLogEntry) -> Self {
    Self {
      entry_id:         encode_uuid(entry.entry_id),
      record_id:        encode_uuid(entry.record_id),
      action:           entry.action.as_str(),
      schedule:         entry.schedule.as_str(),
      old_version:      entry.old_version.as_i64(),
      new_version:      entry.new_version.as_i64(),
      old_renewal_date: entry.old_renewal_date.map(encode_ts),
      new_renewal_date: entry.new_renewal_date.map(encode_ts),
      reason:           entry.reason.clone(),
      migrated_at:      encode_dt(entry.migrated_at),
    }
  }

  fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute(
      "INSERT INTO audit_log (
         entry_id, record_id, action, schedule, old_version, new_version,
         old_renewal_date, new_renewal_date, reason, migrated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
      rusqlite::params![
        self.entry_id,
        self.record_id,
        self.action,
        self.schedule,
        self.old_version,
        self.new_version,
        self.old_renewal_date,
        self.new_renewal_date,
        self.reason,
        self.migrated_at,
      ],
    )?;
    Ok(())
  }
}

fn entry_from(input: NewAuditEntry) -> AuditLogEntry {
  AuditLogEntry {
    entry_id:         Uuid::new_v4(),
    record_id:        input.record_id,
    action:           input.action,
    schedule:         input.schedule,
    old_version:      input.old_version,
    new_version:      input.new_version,
    old_renewal_date: input.old_renewal_date,
    new_renewal_date: input.new_renewal_date,
    reason:           input.reason,
    migrated_at:      Utc::now(),
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A renewals record store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Read every header and its entries, optionally for one record only.
  async fn load(
    &self,
    record_id: Option<Uuid>,
  ) -> Result<Vec<(RawHeader, Vec<RawEntry>)>> {
    let id_str = record_id.map(encode_uuid);

    self
      .conn
      .call(move |conn| {
        let headers = {
          let mut stmt = conn.prepare(&format!(
            "SELECT {HEADER_COLUMNS} FROM records
             WHERE ?1 IS NULL OR record_id = ?1
             ORDER BY created_at, record_id"
          ))?;
          stmt
            .query_map(rusqlite::params![id_str], RawHeader::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut stmt = conn.prepare(&format!(
          "SELECT {ENTRY_COLUMNS} FROM audit_log
           WHERE ?1 IS NULL OR record_id = ?1
           ORDER BY seq"
        ))?;
        let mut by_record: HashMap<String, Vec<RawEntry>> = HashMap::new();
        for raw in stmt.query_map(rusqlite::params![id_str], RawEntry::from_row)? {
          let raw = raw?;
          by_record.entry(raw.record_id.clone()).or_default().push(raw);
        }

        Ok(
          headers
            .into_iter()
            .map(|h| {
              let entries = by_record.remove(&h.record_id).unwrap_or_default();
              (h, entries)
            })
            .collect(),
        )
      })
      .await
      .map_err(Error::from)
  }

  fn fold(raw_header: RawHeader, raw_entries: Vec<RawEntry>) -> Result<BillingRecord> {
    let header = raw_header.into_header()?;
    let entries = raw_entries
      .into_iter()
      .map(RawEntry::into_entry)
      .collect::<Result<Vec<_>>>()?;
    Ok(BillingRecord::fold(header, &entries)?)
  }

  async fn query_entries(
    &self,
    sql: String,
    params: Vec<String>,
  ) -> Result<Vec<AuditLogEntry>> {
    let raws: Vec<RawEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntry::into_entry).collect()
  }
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  // ── Records ───────────────────────────────────────────────────────────────

  async fn insert_record(&self, input: NewRecord) -> Result<BillingRecord> {
    let header = RecordHeader {
      record_id:   Uuid::new_v4(),
      created_at:  Utc::now(),
      anchor_date: input.anchor_date,
      status:      input.status,
    };
    let genesis = entry_from(NewAuditEntry {
      record_id:        header.record_id,
      action:           AuditAction::Created,
      schedule:         input.schedule,
      old_version:      input.calculation_version,
      new_version:      input.calculation_version,
      old_renewal_date: None,
      new_renewal_date: input.renewal_date,
      reason:           String::new(),
      expect:           Precondition { revision: 0, status: input.status },
    });

    let id_str     = encode_uuid(header.record_id);
    let at_str     = encode_dt(header.created_at);
    let anchor_str = header.anchor_date.map(encode_ts);
    let status_str = header.status.as_str();
    let row        = EntryRow::new(&genesis);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO records (record_id, created_at, anchor_date, status)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, at_str, anchor_str, status_str],
        )?;
        row.insert(&tx)?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(BillingRecord::fold(header, &[genesis])?)
  }

  async fn get_record(&self, id: Uuid) -> Result<Option<BillingRecord>> {
    self
      .load(Some(id))
      .await?
      .into_iter()
      .next()
      .map(|(h, entries)| Self::fold(h, entries))
      .transpose()
  }

  async fn list_records(
    &self,
    version: Option<CalculationVersion>,
  ) -> Result<RecordListing> {
    let mut listing = RecordListing::default();
    for (h, entries) in self.load(None).await? {
      let record_id = h.record_id.clone();
      match Self::fold(h, entries) {
        Ok(record) => {
          if version.is_none_or(|v| v == record.calculation_version) {
            listing.records.push(record);
          }
        }
        Err(e) => listing.unreadable.push(SkippedRecord {
          record_id,
          error: e.to_string(),
        }),
      }
    }
    Ok(listing)
  }

  async fn set_status(&self, id: Uuid, status: RecordStatus) -> Result<()> {
    let id_str     = encode_uuid(id);
    let status_str = status.as_str();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE records SET status = ?2 WHERE record_id = ?1",
          rusqlite::params![id_str, status_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::RecordNotFound(id));
    }
    Ok(())
  }

  // ── Audit log ─────────────────────────────────────────────────────────────

  async fn append_entry(&self, input: NewAuditEntry) -> Result<AuditLogEntry> {
    // Reports do not change state and skip the precondition.
    let check = input.action.changes_state();
    let expect_revision = input.expect.revision;
    let expect_status = input.expect.status.as_str();
    let entry = entry_from(input);
    let row = EntryRow::new(&entry);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<(String, i64)> = tx
          .query_row(
            "SELECT r.status,
                    (SELECT COUNT(*) FROM audit_log a
                      WHERE a.record_id = r.record_id
                        AND a.action != 'significant_difference')
               FROM records r
              WHERE r.record_id = ?1",
            rusqlite::params![row.record_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;
        let Some((status, revision)) = current else {
          return Ok(AppendOutcome::Missing);
        };
        if check
          && (status != expect_status
            || u64::try_from(revision).ok() != Some(expect_revision))
        {
          return Ok(AppendOutcome::Conflict);
        }

        row.insert(&tx)?;
        tx.commit()?;
        Ok(AppendOutcome::Appended)
      })
      .await?;

    match outcome {
      AppendOutcome::Appended => Ok(entry),
      AppendOutcome::Missing => Err(Error::RecordNotFound(entry.record_id)),
      AppendOutcome::Conflict => Err(Error::Conflict(entry.record_id)),
    }
  }

  async fn entries_for(&self, record_id: Uuid) -> Result<Vec<AuditLogEntry>> {
    self
      .query_entries(
        format!("SELECT {ENTRY_COLUMNS} FROM audit_log WHERE record_id = ?1 ORDER BY seq"),
        vec![encode_uuid(record_id)],
      )
      .await
  }

  async fn latest_entry(
    &self,
    record_id: Uuid,
    action: AuditAction,
  ) -> Result<Option<AuditLogEntry>> {
    let mut entries = self
      .query_entries(
        format!(
          "SELECT {ENTRY_COLUMNS} FROM audit_log
           WHERE record_id = ?1 AND action = ?2
           ORDER BY seq DESC LIMIT 1"
        ),
        vec![encode_uuid(record_id), action.as_str().to_owned()],
      )
      .await?;
    Ok(entries.pop())
  }

  async fn count_entries(&self) -> Result<Vec<(AuditAction, usize)>> {
    let raws: Vec<(String, i64)> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT action, COUNT(*) FROM audit_log GROUP BY action")?;
        let rows = stmt
          .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(action, n)| Ok((AuditAction::parse(&action)?, decode_count(n)?)))
      .collect()
  }
}
