//! SQL schema for the renewals SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Identity, anchor and status only. Schedule, calculation version and
-- renewal date are folded from audit_log.
CREATE TABLE IF NOT EXISTS records (
    record_id   TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL,   -- RFC 3339 UTC; server-assigned
    anchor_date TEXT,            -- RFC 3339 with the record's own offset
    status      TEXT NOT NULL    -- 'active' | 'cancelled' | 'paused' | 'trial'
);

-- Strictly append-only; the triggers below reject UPDATE and DELETE.
-- seq gives the replay order.
CREATE TABLE IF NOT EXISTS audit_log (
    seq              INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id         TEXT NOT NULL UNIQUE,
    record_id        TEXT NOT NULL REFERENCES records(record_id),
    action           TEXT NOT NULL,
    schedule         TEXT NOT NULL,
    old_version      INTEGER NOT NULL CHECK (old_version IN (1, 2)),
    new_version      INTEGER NOT NULL CHECK (new_version IN (1, 2)),
    old_renewal_date TEXT,
    new_renewal_date TEXT,
    reason           TEXT NOT NULL DEFAULT '',
    migrated_at      TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS audit_log_no_update
BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END;

CREATE INDEX IF NOT EXISTS audit_log_record_idx ON audit_log(record_id, seq);
CREATE INDEX IF NOT EXISTS audit_log_action_idx ON audit_log(action);

PRAGMA user_version = 1;
";
