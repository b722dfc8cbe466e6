//! Ingestion run log.
//!
//! Records every ingestion run with a run id, timestamps, outcome, counts and
//! the list of batches that failed to land. Gives operators an audit trail of
//! what was loaded into a session and when.

use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::diagnostics::FailedBatch;
use crate::error::Result;

/// One ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRunRecord {
    pub id: i64,
    pub run_id: String,
    /// Where the dump came from (file path or "<stream>")
    pub source: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub duration_ms: Option<i64>,
    /// "running", "completed", "partial", "cancelled" or "failed"
    pub outcome: String,
    pub objects: i64,
    pub refs: i64,
    pub failed_batches: Vec<FailedBatch>,
}

/// Run log storage.
///
/// Uses its own connection to the session file per operation so it never
/// shares a transaction with the writer. Callers must not write the log
/// while a batch is open.
pub struct IngestLog {
    db_path: PathBuf,
}

impl IngestLog {
    pub fn new(db_path: &Path) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
        }
    }

    fn connect(&self) -> Result<rusqlite::Connection> {
        let conn = rusqlite::Connection::open(&self.db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    pub fn start_run(&self, run_id: &str, source: &str) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO ingest_log (run_id, source, started_at, outcome)
             VALUES (?1, ?2, ?3, 'running')",
            params![run_id, source, unix_now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn finish_run(
        &self,
        run_id: &str,
        outcome: &str,
        duration_ms: u64,
        objects: u64,
        refs: u64,
        failed_batches: &[FailedBatch],
    ) -> Result<()> {
        let conn = self.connect()?;
        let failed_json = serde_json::to_string(failed_batches)
            .unwrap_or_else(|_| "[]".to_string());

        conn.execute(
            "UPDATE ingest_log
                SET finished_at = ?1, duration_ms = ?2, outcome = ?3,
                    objects = ?4, refs = ?5, failed_batches = ?6
              WHERE run_id = ?7",
            params![
                unix_now(),
                duration_ms as i64,
                outcome,
                objects as i64,
                refs as i64,
                failed_json,
                run_id,
            ],
        )?;
        Ok(())
    }

    /// Runs ordered most recent first.
    pub fn list(&self, limit: Option<usize>) -> Result<Vec<IngestRunRecord>> {
        let conn = self.connect()?;

        let limit_clause = limit.map(|l| format!(" LIMIT {}", l)).unwrap_or_default();
        let sql = format!(
            "SELECT id, run_id, source, started_at, finished_at, duration_ms,
                    outcome, objects, refs, failed_batches
               FROM ingest_log
           ORDER BY started_at DESC, id DESC{}",
            limit_clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map([], |row| {
                let failed_json: String = row.get(9)?;
                Ok(IngestRunRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    source: row.get(2)?,
                    started_at: row.get(3)?,
                    finished_at: row.get(4)?,
                    duration_ms: row.get(5)?,
                    outcome: row.get(6)?,
                    objects: row.get(7)?,
                    refs: row.get(8)?,
                    failed_batches: serde_json::from_str(&failed_json).unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }
}

/// Generate a unique id for an ingestion run.
///
/// Timestamp + process id + per-process counter, all hex.
pub fn generate_run_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("{:x}-{:x}-{:x}", timestamp, std::process::id(), n)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::create_schema;
    use tempfile::TempDir;

    fn setup() -> (TempDir, IngestLog) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("heap.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        create_schema(&conn).unwrap();
        let log = IngestLog::new(&path);
        (dir, log)
    }

    #[test]
    fn test_run_ids_are_unique() {
        let a = generate_run_id();
        let b = generate_run_id();
        assert_ne!(a, b);
        assert_eq!(a.split('-').count(), 3);
    }

    #[test]
    fn test_start_then_finish() {
        let (_dir, log) = setup();
        let run_id = generate_run_id();
        log.start_run(&run_id, "heap.json").unwrap();

        let failed = vec![FailedBatch {
            index: 1,
            first_record: 10,
            last_record: 19,
            objects: 10,
            references: 3,
            reason: "no transaction is active".to_string(),
        }];
        log.finish_run(&run_id, "partial", 12, 20, 6, &failed).unwrap();

        let runs = log.list(None).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome, "partial");
        assert_eq!(runs[0].objects, 20);
        assert_eq!(runs[0].failed_batches, failed);
        assert!(runs[0].finished_at.is_some());
    }

    #[test]
    fn test_list_limit_most_recent_first() {
        let (_dir, log) = setup();
        for source in ["a", "b", "c"] {
            log.start_run(&generate_run_id(), source).unwrap();
        }
        let runs = log.list(Some(2)).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].source, "c");
    }
}
