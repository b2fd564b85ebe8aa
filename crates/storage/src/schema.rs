//! SQLite table layout for cases.
//!
//! Two tables share one column shape:
//!
//! - `cases`: the active version of every case, one row per `case_id`
//! - `case_history`: every superseded version, append-only
//!
//! The invariants live in the schema so that every writer, not only this
//! crate, is held to them: partial unique indexes on the two identity pairs,
//! `CHECK` constraints on state and numeric fields, and triggers for the
//! cross-table version uniqueness, identity immutability, and append-only
//! history.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StorageError;

pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Column list shared by every SELECT and INSERT on `cases` / `case_history`.
pub(crate) const CASE_COLUMNS: &str = "case_id, hostname, device_path, resource_id, cluster_id, \
     state, action, wait_reason, resource_weight, mount_point, host_serial, diagnostic, \
     version_number, active, recorded_at";

pub(crate) const TRIGGER_CASE_VERSION: &str = "case version already recorded";
pub(crate) const TRIGGER_IDENTITY: &str = "case identity is immutable";
#[cfg(test)]
pub(crate) const TRIGGER_APPEND_ONLY: &str = "case history is append-only";
#[cfg(test)]
pub(crate) const TRIGGER_NO_DELETE: &str = "cases are never deleted";

const MIGRATION_V1: &str = "
CREATE TABLE case_ids (
    case_id INTEGER PRIMARY KEY AUTOINCREMENT
);

CREATE TABLE cases (
    case_id          INTEGER PRIMARY KEY,
    hostname         TEXT,
    device_path      TEXT,
    resource_id      INTEGER CHECK (resource_id IS NULL OR resource_id >= 0),
    cluster_id       TEXT,
    state            TEXT NOT NULL CHECK (state IN (
                         'NEW', 'NEW_DETAIL', 'RECOVERY_WAIT', 'RECOVERY_DONE',
                         'RESOURCE_REMOVED', 'DRIVE_TESTING', 'TEST_DONE',
                         'REPLACE_RESOURCE', 'WAIT_FOR_REPLACEMENT', 'REBUILD_RESOURCE',
                         'RESOLVED', 'OPERATOR_NEEDED')),
    action           TEXT NOT NULL DEFAULT 'none',
    wait_reason      TEXT NOT NULL DEFAULT 'none',
    resource_weight  REAL CHECK (resource_weight IS NULL OR resource_weight >= 0),
    mount_point      TEXT,
    host_serial      TEXT,
    diagnostic       TEXT NOT NULL DEFAULT 'unknown'
                         CHECK (diagnostic IN ('unknown', 'pass', 'fail')),
    version_number   INTEGER NOT NULL CHECK (version_number >= 1),
    active           INTEGER NOT NULL DEFAULT 1 CHECK (active = 1),
    recorded_at      TEXT NOT NULL
);

CREATE UNIQUE INDEX uq_active_host_device
    ON cases(hostname, device_path)
    WHERE active = 1;

CREATE UNIQUE INDEX uq_active_resource_cluster
    ON cases(resource_id, cluster_id)
    WHERE active = 1;

CREATE TABLE case_history (
    history_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id          INTEGER NOT NULL REFERENCES cases(case_id),
    hostname         TEXT,
    device_path      TEXT,
    resource_id      INTEGER CHECK (resource_id IS NULL OR resource_id >= 0),
    cluster_id       TEXT,
    state            TEXT NOT NULL CHECK (state IN (
                         'NEW', 'NEW_DETAIL', 'RECOVERY_WAIT', 'RECOVERY_DONE',
                         'RESOURCE_REMOVED', 'DRIVE_TESTING', 'TEST_DONE',
                         'REPLACE_RESOURCE', 'WAIT_FOR_REPLACEMENT', 'REBUILD_RESOURCE',
                         'RESOLVED', 'OPERATOR_NEEDED')),
    action           TEXT NOT NULL,
    wait_reason      TEXT NOT NULL,
    resource_weight  REAL CHECK (resource_weight IS NULL OR resource_weight >= 0),
    mount_point      TEXT,
    host_serial      TEXT,
    diagnostic       TEXT NOT NULL CHECK (diagnostic IN ('unknown', 'pass', 'fail')),
    version_number   INTEGER NOT NULL CHECK (version_number >= 1),
    active           INTEGER NOT NULL DEFAULT 0 CHECK (active = 0),
    recorded_at      TEXT NOT NULL,
    archived_at      TEXT NOT NULL,
    UNIQUE (case_id, version_number)
);

CREATE INDEX idx_case_history_case ON case_history(case_id, version_number ASC);

CREATE TRIGGER trg_history_version_unique
BEFORE INSERT ON case_history
WHEN EXISTS (
    SELECT 1 FROM cases
    WHERE case_id = NEW.case_id AND version_number = NEW.version_number
)
BEGIN
    SELECT RAISE(ABORT, 'case version already recorded');
END;

CREATE TRIGGER trg_cases_version_unique
BEFORE UPDATE OF version_number ON cases
WHEN EXISTS (
    SELECT 1 FROM case_history
    WHERE case_id = NEW.case_id AND version_number = NEW.version_number
)
BEGIN
    SELECT RAISE(ABORT, 'case version already recorded');
END;

CREATE TRIGGER trg_cases_identity_immutable
BEFORE UPDATE ON cases
WHEN (
       OLD.state <> 'NEW'
    OR EXISTS (
           SELECT 1 FROM case_history
           WHERE case_id = OLD.case_id AND state <> 'NEW'
       )
) AND (
       (OLD.hostname IS NOT NULL AND NEW.hostname IS NOT OLD.hostname)
    OR (OLD.device_path IS NOT NULL AND NEW.device_path IS NOT OLD.device_path)
    OR (OLD.resource_id IS NOT NULL AND NEW.resource_id IS NOT OLD.resource_id)
    OR (OLD.cluster_id IS NOT NULL AND NEW.cluster_id IS NOT OLD.cluster_id)
)
BEGIN
    SELECT RAISE(ABORT, 'case identity is immutable');
END;

CREATE TRIGGER trg_cases_no_delete
BEFORE DELETE ON cases
BEGIN
    SELECT RAISE(ABORT, 'cases are never deleted');
END;

CREATE TRIGGER trg_history_no_update
BEFORE UPDATE ON case_history
BEGIN
    SELECT RAISE(ABORT, 'case history is append-only');
END;

CREATE TRIGGER trg_history_no_delete
BEFORE DELETE ON case_history
BEGIN
    SELECT RAISE(ABORT, 'case history is append-only');
END;
";

/// Ordered migrations; index `i` brings the schema to version `i + 1`.
const MIGRATIONS: &[&str] = &[MIGRATION_V1];

/// Create or upgrade the schema on `conn`.
pub(crate) fn bootstrap(conn: &mut Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
    .map_err(|e| StorageError::Backend(e.to_string()))?;

    let current = current_schema_version(conn)?;
    if current > CURRENT_SCHEMA_VERSION {
        return Err(StorageError::Backend(format!(
            "database schema version {current} is newer than supported version {CURRENT_SCHEMA_VERSION}"
        )));
    }

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let version = index as u32 + 1;
        let applied_at =
            crate::record::now_rfc3339().map_err(|e| StorageError::Backend(e.to_string()))?;
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        tx.execute_batch(sql)
            .map_err(|e| StorageError::Backend(format!("migration v{version}: {e}")))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, applied_at],
        )
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        tx.commit()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        tracing::debug!(version, "applied case schema migration");
    }
    Ok(())
}

pub(crate) fn current_schema_version(conn: &Connection) -> Result<u32, StorageError> {
    conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
        row.get::<_, Option<u32>>(0)
    })
    .optional()
    .map(|v| v.flatten().unwrap_or(0))
    .map_err(|e| StorageError::Backend(e.to_string()))
}
