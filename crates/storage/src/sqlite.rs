//! SQLite-backed `CaseStore`.
//!
//! Every write runs in a `BEGIN IMMEDIATE` transaction so concurrent
//! processes sharing one database file serialize on the write lock, and the
//! schema (see `schema.rs`) has the final word on every invariant.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{
    ffi, params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};

use crate::error::StorageError;
use crate::record::{now_rfc3339, Case, CaseState, IdentityConstraint, IdentityKey, ParseEnumError};
use crate::schema::{self, CASE_COLUMNS};
use crate::traits::{require_case_id, CaseStore};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A `CaseStore` over one SQLite connection.
pub struct SqliteCaseStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteCaseStore {
    /// Open (or create) the database file at `path` and bring its schema up
    /// to date. Missing parent directories are created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Backend(format!("could not create '{}': {e}", parent.display()))
                })?;
            }
        }
        let conn = Connection::open(path).map_err(backend)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(backend)?;
        tracing::debug!(path = %path.display(), "opened case database");
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// A private, throwaway database. Used by tests and dry runs.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::from_connection(conn, None)
    }

    fn from_connection(mut conn: Connection, path: Option<PathBuf>) -> Result<Self, StorageError> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(backend)?;
        schema::bootstrap(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// The database file, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> Result<u32, StorageError> {
        let conn = self.lock()?;
        schema::current_schema_version(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Backend("connection lock poisoned".to_string()))
    }

    /// Run `f` inside an immediate write transaction. Returning `Err` from
    /// `f` drops the transaction, which rolls it back.
    fn write<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(backend)?;
        let out = f(&tx)?;
        tx.commit().map_err(backend)?;
        Ok(out)
    }
}

impl CaseStore for SqliteCaseStore {
    fn insert_case(&self, case: &Case) -> Result<Case, StorageError> {
        case.validate().map_err(StorageError::InvalidRecord)?;
        let stored = self.write(|tx| {
            tx.execute("INSERT INTO case_ids DEFAULT VALUES", [])
                .map_err(backend)?;
            let mut stored = case.clone();
            stored.case_id = Some(tx.last_insert_rowid());
            stored.version_number = 1;
            stored.active = true;
            stored.recorded_at = Some(timestamp()?);
            insert_active_row(tx, &stored).map_err(|e| write_error(e, &stored))?;
            Ok(stored)
        })?;
        tracing::info!(
            case_id = stored.case_id,
            state = %stored.state,
            "inserted case"
        );
        Ok(stored)
    }

    fn load_active(&self, case_id: i64) -> Result<Case, StorageError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {CASE_COLUMNS} FROM cases WHERE case_id = ?1"),
            params![case_id],
            case_from_row,
        )
        .optional()
        .map_err(read_error)?
        .ok_or(StorageError::CaseNotFound {
            case_id,
            version: None,
        })
    }

    fn load_version(&self, case_id: i64, version_number: i64) -> Result<Case, StorageError> {
        let conn = self.lock()?;
        let active = conn
            .query_row(
                &format!(
                    "SELECT {CASE_COLUMNS} FROM cases WHERE case_id = ?1 AND version_number = ?2"
                ),
                params![case_id, version_number],
                case_from_row,
            )
            .optional()
            .map_err(read_error)?;
        if let Some(case) = active {
            return Ok(case);
        }
        conn.query_row(
            &format!(
                "SELECT {CASE_COLUMNS} FROM case_history WHERE case_id = ?1 AND version_number = ?2"
            ),
            params![case_id, version_number],
            case_from_row,
        )
        .optional()
        .map_err(read_error)?
        .ok_or(StorageError::CaseNotFound {
            case_id,
            version: Some(version_number),
        })
    }

    fn update_active(&self, case: &Case) -> Result<Case, StorageError> {
        case.validate().map_err(StorageError::InvalidRecord)?;
        let case_id = require_case_id(case)?;
        self.write(|tx| {
            let current = active_version(tx, case_id)?;
            if current != case.version_number {
                return Err(StorageError::PersistenceConflict {
                    case_id,
                    expected_version: case.version_number,
                });
            }
            let mut stored = case.clone();
            stored.active = true;
            stored.recorded_at = Some(timestamp()?);
            let changed =
                update_active_row(tx, &stored, current).map_err(|e| write_error(e, &stored))?;
            if changed != 1 {
                return Err(StorageError::PersistenceConflict {
                    case_id,
                    expected_version: case.version_number,
                });
            }
            tracing::debug!(case_id, version = stored.version_number, "updated case in place");
            Ok(stored)
        })
    }

    fn supersede_active(&self, case: &Case) -> Result<Case, StorageError> {
        case.validate().map_err(StorageError::InvalidRecord)?;
        let case_id = require_case_id(case)?;
        self.write(|tx| {
            let previous = tx
                .query_row(
                    &format!("SELECT {CASE_COLUMNS} FROM cases WHERE case_id = ?1"),
                    params![case_id],
                    case_from_row,
                )
                .optional()
                .map_err(read_error)?
                .ok_or(StorageError::CaseNotFound {
                    case_id,
                    version: None,
                })?;
            if previous.version_number != case.version_number {
                return Err(StorageError::PersistenceConflict {
                    case_id,
                    expected_version: case.version_number,
                });
            }

            let now = timestamp()?;
            let mut next = case.clone();
            next.version_number = previous.version_number + 1;
            next.active = true;
            next.recorded_at = Some(now.clone());

            // The active row moves first: the history trigger refuses a row
            // whose version is still the active one.
            let changed = update_active_row(tx, &next, previous.version_number)
                .map_err(|e| write_error(e, &next))?;
            if changed != 1 {
                return Err(StorageError::PersistenceConflict {
                    case_id,
                    expected_version: case.version_number,
                });
            }
            insert_history_row(tx, &previous, &now).map_err(|e| write_error(e, &previous))?;

            tracing::info!(
                case_id,
                from_version = previous.version_number,
                to_version = next.version_number,
                from_state = %previous.state,
                to_state = %next.state,
                "superseded case version"
            );
            Ok(next)
        })
    }

    fn history(&self, case_id: i64) -> Result<Vec<Case>, StorageError> {
        let conn = self.lock()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM cases WHERE case_id = ?1",
                params![case_id],
                |_| Ok(()),
            )
            .optional()
            .map_err(read_error)?
            .is_some();
        if !exists {
            return Err(StorageError::CaseNotFound {
                case_id,
                version: None,
            });
        }
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CASE_COLUMNS} FROM case_history WHERE case_id = ?1 \
                 ORDER BY version_number ASC"
            ))
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![case_id], case_from_row)
            .map_err(read_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(read_error)
    }

    fn list_active(&self, state_filter: Option<CaseState>) -> Result<Vec<Case>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CASE_COLUMNS} FROM cases \
                 WHERE active = 1 AND (?1 IS NULL OR state = ?1) \
                 ORDER BY case_id ASC"
            ))
            .map_err(backend)?;
        let filter = state_filter.map(CaseState::as_str);
        let rows = stmt
            .query_map(params![filter], case_from_row)
            .map_err(read_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(read_error)
    }

    fn find_active(&self, key: &IdentityKey) -> Result<Option<Case>, StorageError> {
        let conn = self.lock()?;
        let found = match key {
            IdentityKey::HostDevice {
                hostname,
                device_path,
            } => conn.query_row(
                &format!(
                    "SELECT {CASE_COLUMNS} FROM cases \
                     WHERE active = 1 AND hostname = ?1 AND device_path = ?2"
                ),
                params![hostname, device_path],
                case_from_row,
            ),
            IdentityKey::ResourceCluster {
                resource_id,
                cluster_id,
            } => conn.query_row(
                &format!(
                    "SELECT {CASE_COLUMNS} FROM cases \
                     WHERE active = 1 AND resource_id = ?1 AND cluster_id = ?2"
                ),
                params![resource_id, cluster_id],
                case_from_row,
            ),
        };
        found.optional().map_err(read_error)
    }
}

// ── Row helpers ──────────────────────────────────────────────────────────────

fn insert_active_row(tx: &Transaction<'_>, case: &Case) -> rusqlite::Result<usize> {
    tx.execute(
        &format!(
            "INSERT INTO cases ({CASE_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            case.case_id,
            case.hostname,
            case.device_path,
            case.resource_id,
            case.cluster_id,
            case.state.as_str(),
            case.action.as_str(),
            case.wait_reason.as_str(),
            case.resource_weight,
            case.mount_point,
            case.host_serial,
            case.diagnostic.as_str(),
            case.version_number,
            true,
            case.recorded_at,
        ],
    )
}

/// Rewrite the active row, guarded on the version the caller read.
fn update_active_row(
    tx: &Transaction<'_>,
    case: &Case,
    expected_version: i64,
) -> rusqlite::Result<usize> {
    tx.execute(
        "UPDATE cases SET
            hostname = ?2, device_path = ?3, resource_id = ?4, cluster_id = ?5,
            state = ?6, action = ?7, wait_reason = ?8, resource_weight = ?9,
            mount_point = ?10, host_serial = ?11, diagnostic = ?12,
            version_number = ?13, recorded_at = ?14
         WHERE case_id = ?1 AND version_number = ?15",
        params![
            case.case_id,
            case.hostname,
            case.device_path,
            case.resource_id,
            case.cluster_id,
            case.state.as_str(),
            case.action.as_str(),
            case.wait_reason.as_str(),
            case.resource_weight,
            case.mount_point,
            case.host_serial,
            case.diagnostic.as_str(),
            case.version_number,
            case.recorded_at,
            expected_version,
        ],
    )
}

fn insert_history_row(
    tx: &Transaction<'_>,
    case: &Case,
    archived_at: &str,
) -> rusqlite::Result<usize> {
    tx.execute(
        &format!(
            "INSERT INTO case_history ({CASE_COLUMNS}, archived_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            case.case_id,
            case.hostname,
            case.device_path,
            case.resource_id,
            case.cluster_id,
            case.state.as_str(),
            case.action.as_str(),
            case.wait_reason.as_str(),
            case.resource_weight,
            case.mount_point,
            case.host_serial,
            case.diagnostic.as_str(),
            case.version_number,
            false,
            case.recorded_at,
            archived_at,
        ],
    )
}

fn active_version(tx: &Transaction<'_>, case_id: i64) -> Result<i64, StorageError> {
    tx.query_row(
        "SELECT version_number FROM cases WHERE case_id = ?1",
        params![case_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(read_error)?
    .ok_or(StorageError::CaseNotFound {
        case_id,
        version: None,
    })
}

fn case_from_row(row: &Row<'_>) -> rusqlite::Result<Case> {
    Ok(Case {
        case_id: row.get(0)?,
        hostname: row.get(1)?,
        device_path: row.get(2)?,
        resource_id: row.get(3)?,
        cluster_id: row.get(4)?,
        state: parse_column(row, 5)?,
        action: parse_column(row, 6)?,
        wait_reason: parse_column(row, 7)?,
        resource_weight: row.get(8)?,
        mount_point: row.get(9)?,
        host_serial: row.get(10)?,
        diagnostic: parse_column(row, 11)?,
        version_number: row.get(12)?,
        active: row.get(13)?,
        recorded_at: row.get(14)?,
    })
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ── Error mapping ────────────────────────────────────────────────────────────

fn timestamp() -> Result<String, StorageError> {
    now_rfc3339().map_err(|e| StorageError::Backend(e.to_string()))
}

fn backend(err: rusqlite::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn read_error(err: rusqlite::Error) -> StorageError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(idx, _, cause) => {
            StorageError::InvalidRecord(format!("column {idx}: {cause}"))
        }
        other => backend(other),
    }
}

/// Translate a failed write into the storage taxonomy, using the schema's
/// constraint and trigger messages to tell the cases apart.
fn write_error(err: rusqlite::Error, case: &Case) -> StorageError {
    let rusqlite::Error::SqliteFailure(code, message) = &err else {
        return read_error(err);
    };
    let message = message.clone().unwrap_or_default();
    let case_id = case.case_id.unwrap_or_default();
    match code.extended_code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            if message.contains("cases.device_path") {
                duplicate(IdentityConstraint::HostDevice, case.host_device_key())
            } else if message.contains("cases.resource_id") {
                duplicate(
                    IdentityConstraint::ResourceCluster,
                    case.resource_cluster_key(),
                )
            } else {
                StorageError::PersistenceConflict {
                    case_id,
                    expected_version: case.version_number,
                }
            }
        }
        ffi::SQLITE_CONSTRAINT_TRIGGER => {
            if message.contains(schema::TRIGGER_IDENTITY) {
                StorageError::IdentityImmutable { case_id }
            } else if message.contains(schema::TRIGGER_CASE_VERSION) {
                StorageError::PersistenceConflict {
                    case_id,
                    expected_version: case.version_number,
                }
            } else {
                StorageError::Backend(message)
            }
        }
        ffi::SQLITE_CONSTRAINT_CHECK | ffi::SQLITE_CONSTRAINT_NOTNULL => {
            StorageError::InvalidRecord(message)
        }
        _ => backend(err),
    }
}

fn duplicate(constraint: IdentityConstraint, key: Option<IdentityKey>) -> StorageError {
    StorageError::DuplicateActiveCase {
        constraint,
        detail: key.map(|k| k.to_string()).unwrap_or_default(),
    }
}
