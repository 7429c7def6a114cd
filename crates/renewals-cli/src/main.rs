//! `renewals`: operator tool for subscription renewal dates.
//!
//! # Usage
//!
//! ```text
//! renewals add monthly --anchor 2025-01-31T00:00:00Z
//! renewals compare <id>
//! renewals migrate-all --dry-run --reason "preview v2 rollout"
//! renewals rollback <id> --reason "customer complaint"
//! renewals stats --json
//! ```

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use chrono::DateTime;
use clap::{Parser, Subcommand};
use renewals_core::{
  clock::{Clock, SystemClock},
  engine::Timestamp,
  migration::{MigrationManager, Transition},
  record::{BillingRecord, NewRecord, RecordStatus},
  reminder::{days_until, reminder_due},
  schedule::{CalculationVersion, RecurrenceSchedule},
  service::RecordService,
  store::SkippedRecord,
};
use renewals_store_sqlite::SqliteStore;
use serde::Serialize;
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Subscription renewal date administration")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "renewals.toml")]
  config: PathBuf,

  /// Print results as JSON instead of text.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create a record.
  Add {
    #[arg(value_parser = parse_schedule)]
    schedule: RecurrenceSchedule,
    /// Historical start date (RFC 3339, with offset). Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    anchor: Option<Timestamp>,
    #[arg(long, value_parser = parse_status, default_value = "active")]
    status: RecordStatus,
    /// Calculation version (1 or 2). Defaults to `default_version`.
    #[arg(long, value_parser = parse_version)]
    version: Option<CalculationVersion>,
  },
  /// Show a record and its audit history.
  Show { id: Uuid },
  /// List all records.
  List,
  /// Change a record's schedule, reconciling its renewal date.
  SetSchedule {
    id:       Uuid,
    #[arg(value_parser = parse_schedule)]
    schedule: RecurrenceSchedule,
  },
  /// Change a record's status. Leaves the renewal date alone.
  SetStatus {
    id:     Uuid,
    #[arg(value_parser = parse_status)]
    status: RecordStatus,
  },
  /// Explicitly set a future renewal date.
  Override {
    id:     Uuid,
    #[arg(value_parser = parse_timestamp)]
    date:   Timestamp,
    #[arg(long, default_value = "manual override")]
    reason: String,
  },
  /// List active records by days until renewal. `*` marks records inside
  /// the reminder window; sent reminders are not tracked here.
  Due,
  /// Show what each calculation version yields for a record.
  Compare { id: Uuid },
  /// Promote one record to version 2.
  Migrate {
    id:     Uuid,
    #[arg(long, default_value = "manual migration")]
    reason: String,
  },
  /// Promote every version 1 record.
  MigrateAll {
    /// Report divergences without changing any record.
    #[arg(long)]
    dry_run: bool,
    #[arg(long, default_value = "batch migration")]
    reason:  String,
  },
  /// Return one record to version 1.
  Rollback {
    id:     Uuid,
    #[arg(long, default_value = "manual rollback")]
    reason: String,
  },
  /// Print version and audit-log counts.
  Stats,
}

fn parse_schedule(s: &str) -> Result<RecurrenceSchedule, String> {
  RecurrenceSchedule::parse(s).map_err(|e| e.to_string())
}

fn parse_status(s: &str) -> Result<RecordStatus, String> {
  RecordStatus::parse(s).map_err(|e| e.to_string())
}

fn parse_version(s: &str) -> Result<CalculationVersion, String> {
  let n: i64 = s.parse().map_err(|_| format!("not an integer: {s:?}"))?;
  CalculationVersion::try_from(n).map_err(|e| e.to_string())
}

/// Dates must carry an explicit offset; bare calendar dates are refused.
fn parse_timestamp(s: &str) -> Result<Timestamp, String> {
  DateTime::parse_from_rfc3339(s)
    .map_err(|e| format!("expected an RFC 3339 date with offset: {e}"))
}

// ─── Output ───────────────────────────────────────────────────────────────────

/// Print `value` as pretty JSON, or run `text` to print it for humans.
fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
  if json {
    println!("{}", serde_json::to_string_pretty(value)?);
  } else {
    text(value);
  }
  Ok(())
}

fn fmt_date(date: Option<Timestamp>) -> String {
  date.map_or_else(|| "-".to_owned(), |d| d.to_rfc3339())
}

fn print_record(r: &BillingRecord) {
  println!(
    "{}  {:<9} {:<9} {}  renews {}",
    r.record_id,
    r.schedule,
    r.status,
    r.calculation_version,
    fmt_date(r.renewal_date),
  );
}

fn print_transition(t: &Transition) {
  match t {
    Transition::Applied(e) => println!(
      "{}: {} -> {}, renewal {} -> {}",
      e.action,
      e.old_version,
      e.new_version,
      fmt_date(e.old_renewal_date),
      fmt_date(e.new_renewal_date),
    ),
    Transition::AlreadyCurrent => println!("already on the target version; nothing to do"),
  }
}

#[derive(Serialize)]
struct DueRow {
  record:       BillingRecord,
  days_until:   i64,
  reminder_due: bool,
}

/// Active, dated records ordered by days until renewal. This tool keeps no
/// reminder history, so `reminder_due` only says the renewal is inside the
/// lead window.
fn due_rows(records: Vec<BillingRecord>, lead_days: i64, now: Timestamp) -> Vec<DueRow> {
  let mut rows: Vec<DueRow> = records
    .into_iter()
    .filter(|r| r.status.is_active())
    .filter_map(|r| {
      let renewal = r.renewal_date?;
      Some(DueRow {
        days_until:   days_until(renewal, now),
        reminder_due: reminder_due(Some(renewal), None, lead_days, now),
        record:       r,
      })
    })
    .collect();
  rows.sort_by_key(|row| row.days_until);
  rows
}

fn print_skipped(skipped: &[SkippedRecord]) {
  for r in skipped {
    println!("  skipped {}: {}", r.record_id, r.error);
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr so `--json` output stays machine-readable.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store_path = settings.store_path();
  let store = Arc::new(
    SqliteStore::open(&store_path)
      .await
      .with_context(|| format!("failed to open store at {store_path:?}"))?,
  );
  let service = RecordService::new(store.clone());
  let manager =
    MigrationManager::new(store).with_threshold(settings.significant_difference());
  let json = cli.json;

  match cli.command {
    Command::Add { schedule, anchor, status, version } => {
      let mut input = NewRecord::new(schedule);
      input.anchor_date = anchor;
      input.status = status;
      input.calculation_version = match version {
        Some(v) => v,
        None => settings.default_version()?,
      };
      let record = service.create(input).await.context("failed to create record")?;
      emit(json, &record, print_record)?;
    }

    Command::Show { id } => {
      let record = service.get(id).await?;
      let history = service.history(id).await?;
      emit(json, &(record, history), |(record, history)| {
        print_record(record);
        for e in history {
          println!(
            "  {}  {:<22} {} -> {}  {} -> {}  {}",
            e.migrated_at.to_rfc3339(),
            e.action,
            e.old_version,
            e.new_version,
            fmt_date(e.old_renewal_date),
            fmt_date(e.new_renewal_date),
            e.reason,
          );
        }
      })?;
    }

    Command::List => {
      let listing = service.list().await?;
      emit(json, &listing, |listing| {
        listing.records.iter().for_each(print_record);
        print_skipped(&listing.unreadable);
      })?;
    }

    Command::SetSchedule { id, schedule } => {
      let record = service
        .change_schedule(id, schedule)
        .await
        .with_context(|| format!("failed to change schedule of {id}"))?;
      emit(json, &record, print_record)?;
    }

    Command::SetStatus { id, status } => {
      let record = service.set_status(id, status).await?;
      emit(json, &record, print_record)?;
    }

    Command::Override { id, date, reason } => {
      let record = service
        .override_renewal(id, date, reason)
        .await
        .with_context(|| format!("failed to override renewal of {id}"))?;
      emit(json, &record, print_record)?;
    }

    Command::Due => {
      let listing = service.list().await?;
      let rows = due_rows(listing.records, settings.reminder_lead_days, SystemClock.now());
      emit(json, &rows, |rows| {
        for row in rows {
          let flag = if row.reminder_due { "*" } else { " " };
          print!("{flag} {:>4}d  ", row.days_until);
          print_record(&row.record);
        }
      })?;
    }

    Command::Compare { id } => {
      let cmp = manager.compare(id).await?;
      emit(json, &cmp, |cmp| {
        println!("v1: {}", cmp.legacy.to_rfc3339());
        println!("v2: {}", cmp.anniversary.to_rfc3339());
        println!("difference: {} days", cmp.difference().num_days());
      })?;
    }

    Command::Migrate { id, reason } => {
      let outcome = manager
        .migrate_one(id, &reason)
        .await
        .with_context(|| format!("failed to migrate {id}"))?;
      emit(json, &outcome, print_transition)?;
    }

    Command::MigrateAll { dry_run, reason } => {
      let report = manager.batch_migrate(dry_run, &reason).await?;
      emit(json, &report, |r| {
        println!(
          "{}examined {}, significant {}, migrated {}, skipped {}",
          if r.dry_run { "[dry run] " } else { "" },
          r.examined,
          r.significant,
          r.migrated,
          r.skipped.len(),
        );
        print_skipped(&r.skipped);
      })?;
    }

    Command::Rollback { id, reason } => {
      let outcome = manager
        .rollback_one(id, &reason)
        .await
        .with_context(|| format!("failed to roll back {id}"))?;
      emit(json, &outcome, print_transition)?;
    }

    Command::Stats => {
      let stats = manager.stats().await?;
      emit(json, &stats, |s| {
        println!("v1 records:          {}", s.v1_count);
        println!("v2 records:          {}", s.v2_count);
        println!("audit entries:       {}", s.total_audit_entries);
        println!("rollbacks:           {}", s.rollback_count);
        println!("lifecycle entries:   {}", s.lifecycle_entries);
        println!("unreadable records:  {}", s.unreadable_count);
      })?;
    }
  }

  Ok(())
}
