//! DuckDB record store

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{parse_policy_str, to_policy_string, PolicyRecord, RecordKind};
use crate::ports::PolicyStore;
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of attempts when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const SELECT_RECORDS: &str = "SELECT record_id, kind, name, policy, metadata, enabled, version,
        created_at, updated_at
 FROM sys_policy_records";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

fn db_error(err: duckdb::Error) -> Error {
    Error::database(err.to_string())
}

/// DuckDB-backed `PolicyStore`
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

/// Columns as stored, before conversion into a `PolicyRecord`
struct RecordRow {
    record_id: String,
    kind: String,
    name: String,
    policy: String,
    metadata: String,
    enabled: bool,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl DuckDbRepository {
    /// Open (or create) a database file
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock.
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[ledgerguard] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// In-memory store, mainly for tests and dry runs
    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> anyhow::Result<Connection> {
        // Extension autoloading stays off; JSON support is linked statically
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    /// Run pending migrations against this database
    pub fn run_migrations(&self) -> anyhow::Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure the schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> anyhow::Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    fn query_rows(&self, sql: &str, args: &[&dyn duckdb::ToSql]) -> Result<Vec<PolicyRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(db_error)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok(RecordRow {
                    record_id: row.get(0)?,
                    kind: row.get(1)?,
                    name: row.get(2)?,
                    policy: row.get(3)?,
                    metadata: row.get(4)?,
                    enabled: row.get(5)?,
                    version: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            })
            .map_err(db_error)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row_to_record(row.map_err(db_error)?)?);
        }
        Ok(records)
    }

    fn current_version(conn: &Connection, id: Uuid) -> Result<Option<i64>> {
        let mut stmt = conn
            .prepare("SELECT version FROM sys_policy_records WHERE record_id = ?")
            .map_err(db_error)?;
        let mut rows = stmt.query([id.to_string()]).map_err(db_error)?;
        match rows.next().map_err(db_error)? {
            Some(row) => Ok(Some(row.get(0).map_err(db_error)?)),
            None => Ok(None),
        }
    }
}

impl PolicyStore for DuckDbRepository {
    fn insert_record(&self, record: &PolicyRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_policy_records (
                record_id, kind, name, policy, metadata, enabled, version,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id.to_string(),
                record.kind.as_str(),
                &record.name,
                to_policy_string(&record.policy),
                record.metadata.to_string(),
                record.enabled,
                record.version,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_error)?;
        Ok(())
    }

    fn get_record(&self, id: Uuid) -> Result<Option<PolicyRecord>> {
        let sql = format!("{} WHERE record_id = ?", SELECT_RECORDS);
        let id = id.to_string();
        Ok(self.query_rows(&sql, &[&id])?.into_iter().next())
    }

    fn list_records(&self, kind: Option<RecordKind>) -> Result<Vec<PolicyRecord>> {
        match kind {
            Some(kind) => {
                let sql = format!("{} WHERE kind = ? ORDER BY created_at, name", SELECT_RECORDS);
                self.query_rows(&sql, &[&kind.as_str()])
            }
            None => {
                let sql = format!("{} ORDER BY created_at, name", SELECT_RECORDS);
                self.query_rows(&sql, &[])
            }
        }
    }

    fn update_record(&self, record: &PolicyRecord, expected_version: i64) -> Result<PolicyRecord> {
        let updated_at = Utc::now();
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE sys_policy_records
                 SET name = ?, policy = ?, metadata = ?, enabled = ?,
                     version = version + 1, updated_at = ?
                 WHERE record_id = ? AND version = ?",
                params![
                    &record.name,
                    to_policy_string(&record.policy),
                    record.metadata.to_string(),
                    record.enabled,
                    updated_at.to_rfc3339(),
                    record.id.to_string(),
                    expected_version,
                ],
            )
            .map_err(db_error)?;

        if changed == 0 {
            return match Self::current_version(&conn, record.id)? {
                Some(current) => Err(Error::conflict(format!(
                    "record {} is at version {}, not {}",
                    record.id, current, expected_version
                ))),
                None => Err(Error::not_found(format!("record {}", record.id))),
            };
        }

        let mut stored = record.clone();
        stored.version = expected_version + 1;
        stored.updated_at = updated_at;
        Ok(stored)
    }

    fn delete_record(&self, id: Uuid) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM sys_policy_records WHERE record_id = ?",
                [id.to_string()],
            )
            .map_err(db_error)?;
        Ok(deleted > 0)
    }
}

/// Convert stored columns; policies go through the tolerant reader so
/// hand-edited or legacy rows still load
fn row_to_record(row: RecordRow) -> Result<PolicyRecord> {
    let id = Uuid::parse_str(&row.record_id)
        .map_err(|e| Error::database(format!("invalid record id '{}': {}", row.record_id, e)))?;
    let kind = row.kind.parse::<RecordKind>().map_err(Error::database)?;
    let metadata = serde_json::from_str::<serde_json::Value>(&row.metadata)
        .ok()
        .filter(serde_json::Value::is_object)
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

    Ok(PolicyRecord {
        id,
        kind,
        name: row.name,
        policy: parse_policy_str(&row.policy),
        metadata,
        enabled: row.enabled,
        version: row.version,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Condition, LogicalOperator, Policy};

    fn repo() -> DuckDbRepository {
        let repo = DuckDbRepository::in_memory().unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    fn sample_record() -> PolicyRecord {
        PolicyRecord::new(
            RecordKind::AutomationRule,
            "Hold large invoices",
            Policy::new(
                LogicalOperator::Or,
                vec![Condition::new("grand_total", ">", 50000)],
            ),
        )
        .with_metadata(serde_json::json!({"action": "hold"}))
    }

    #[test]
    fn test_retryable_error_detection() {
        assert!(is_retryable_error("IO Error: Database is locked"));
        assert!(is_retryable_error("The process cannot access the file"));
        assert!(!is_retryable_error("Catalog Error: Table does not exist"));
    }

    #[test]
    fn test_insert_and_get() {
        let repo = repo();
        let record = sample_record();
        repo.insert_record(&record).unwrap();

        let loaded = repo.get_record(record.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Hold large invoices");
        assert_eq!(loaded.kind, RecordKind::AutomationRule);
        assert_eq!(loaded.policy, record.policy);
        assert_eq!(loaded.metadata["action"], "hold");
        assert_eq!(loaded.version, 1);

        assert!(repo.get_record(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_legacy_policy_rows_load() {
        let repo = repo();
        {
            let conn = repo.lock().unwrap();
            conn.execute(
                "INSERT INTO sys_policy_records
                 (record_id, kind, name, policy, metadata, enabled, version, created_at, updated_at)
                 VALUES (?, 'sla', 'Legacy', ?, 'null', true, 4, '2024-01-01T00:00:00+00:00', 'garbage')",
                params![
                    Uuid::new_v4().to_string(),
                    r#"[{"field":"days_past_due","operator":">","value":30}]"#,
                ],
            )
            .unwrap();
        }

        let records = repo.list_records(Some(RecordKind::Sla)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].policy.logical_operator, LogicalOperator::And);
        assert_eq!(
            records[0].policy.conditions,
            vec![Condition::new("days_past_due", ">", 30)]
        );
        assert!(records[0].metadata.is_object());
        assert_eq!(records[0].version, 4);
    }

    #[test]
    fn test_list_filters_by_kind() {
        let repo = repo();
        repo.insert_record(&sample_record()).unwrap();
        repo.insert_record(&PolicyRecord::new(RecordKind::Sla, "SLA", Policy::seed()))
            .unwrap();

        assert_eq!(repo.list_records(None).unwrap().len(), 2);
        assert_eq!(repo.list_records(Some(RecordKind::Sla)).unwrap().len(), 1);
        assert!(repo
            .list_records(Some(RecordKind::PermissionPolicy))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_update_bumps_version() {
        let repo = repo();
        let mut record = sample_record();
        repo.insert_record(&record).unwrap();

        record.name = "Hold very large invoices".to_string();
        let stored = repo.update_record(&record, 1).unwrap();
        assert_eq!(stored.version, 2);

        let loaded = repo.get_record(record.id).unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.name, "Hold very large invoices");
    }

    #[test]
    fn test_stale_update_conflicts() {
        let repo = repo();
        let record = sample_record();
        repo.insert_record(&record).unwrap();
        repo.update_record(&record, 1).unwrap();

        let err = repo.update_record(&record, 1).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn test_update_missing_record() {
        let repo = repo();
        let err = repo.update_record(&sample_record(), 1).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_delete() {
        let repo = repo();
        let record = sample_record();
        repo.insert_record(&record).unwrap();

        assert!(repo.delete_record(record.id).unwrap());
        assert!(!repo.delete_record(record.id).unwrap());
        assert!(repo.get_record(record.id).unwrap().is_none());
    }
}
