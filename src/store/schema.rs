//! On-disk schema and the read-only open preflight.
//!
//! Preflight rules:
//! - the path must exist and be a SQLite database
//! - `memsee_meta` must exist with a `schema_version` column and row `id=1`
//! - `schema_version` must equal [`SCHEMA_VERSION`]
//! - the `obj` and `ref` collections must exist
//!
//! The preflight opens the file READ_ONLY and never mutates it.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, OpenFlags, OptionalExtension};

use crate::error::{MemseeError, Result};

/// Schema version written by `create` and required by `open`.
///
/// Version 1: obj/ref/env collections.
/// Version 2: added ingest_log for per-run audit rows.
pub const SCHEMA_VERSION: i64 = 2;

/// Create every table and index of a fresh store.
pub fn create_schema(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memsee_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS obj (
            seq INTEGER PRIMARY KEY,
            address INTEGER NOT NULL UNIQUE,
            type TEXT NOT NULL,
            name TEXT,
            value TEXT,
            size INTEGER NOT NULL,
            len INTEGER,
            repr TEXT,
            top INTEGER NOT NULL DEFAULT 0,
            mark INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_obj_type ON obj(type);
        CREATE INDEX IF NOT EXISTS idx_obj_size ON obj(size);
        CREATE INDEX IF NOT EXISTS idx_obj_name ON obj(name);
        CREATE INDEX IF NOT EXISTS idx_obj_mark ON obj(mark);

        CREATE TABLE IF NOT EXISTS ref (
            seq INTEGER PRIMARY KEY,
            parent INTEGER NOT NULL,
            child INTEGER NOT NULL,
            label TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_ref_parent ON ref(parent);
        CREATE INDEX IF NOT EXISTS idx_ref_child ON ref(child);

        CREATE TABLE IF NOT EXISTS env (
            name TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ingest_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL UNIQUE,
            source TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            finished_at INTEGER,
            duration_ms INTEGER,
            outcome TEXT NOT NULL,
            objects INTEGER NOT NULL DEFAULT 0,
            refs INTEGER NOT NULL DEFAULT 0,
            failed_batches TEXT NOT NULL DEFAULT '[]'
        );
        CREATE INDEX IF NOT EXISTS idx_ingest_log_started_at ON ingest_log(started_at DESC);",
    )?;

    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    conn.execute(
        "INSERT OR IGNORE INTO memsee_meta (id, schema_version, created_at) VALUES (1, ?1, ?2)",
        params![SCHEMA_VERSION, created_at],
    )?;

    Ok(())
}

/// Read-only compatibility check for an existing store.
///
/// Returns the creation timestamp recorded in `memsee_meta`.
pub fn preflight(db_path: &Path) -> Result<i64> {
    let incompatible = |reason: &str| MemseeError::IncompatibleStore {
        path: db_path.to_path_buf(),
        reason: reason.to_string(),
    };

    if !db_path.exists() {
        return Err(incompatible("no such file"));
    }

    let conn = rusqlite::Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| map_sqlite_err(db_path, e))?;

    // Touching sqlite_master forces SQLite to parse the header.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .map_err(|e| map_sqlite_err(db_path, e))?;

    if !has_table(&conn, "memsee_meta").map_err(|e| map_sqlite_err(db_path, e))? {
        return Err(incompatible("missing memsee_meta table"));
    }

    let has_version_col: bool = conn
        .query_row(
            "SELECT 1 FROM pragma_table_info('memsee_meta') WHERE name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()
        .map_err(|e| map_sqlite_err(db_path, e))?
        .unwrap_or(false);
    if !has_version_col {
        return Err(incompatible("memsee_meta missing schema_version column"));
    }

    let found: Option<(i64, i64)> = conn
        .query_row(
            "SELECT schema_version, created_at FROM memsee_meta WHERE id=1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| map_sqlite_err(db_path, e))?;

    let Some((version, created_at)) = found else {
        return Err(incompatible("memsee_meta missing row id=1"));
    };

    if version != SCHEMA_VERSION {
        return Err(incompatible(&format!(
            "schema version mismatch (found={}, expected={})",
            version, SCHEMA_VERSION
        )));
    }

    for table in ["obj", "ref"] {
        if !has_table(&conn, table).map_err(|e| map_sqlite_err(db_path, e))? {
            return Err(incompatible(&format!("missing {} table", table)));
        }
    }

    Ok(created_at)
}

fn has_table(conn: &rusqlite::Connection, name: &str) -> rusqlite::Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1 LIMIT 1",
            params![name],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false))
}

fn map_sqlite_err(db_path: &Path, err: rusqlite::Error) -> MemseeError {
    match err {
        rusqlite::Error::SqliteFailure(sql_err, _) => {
            let reason = match sql_err.code {
                rusqlite::ErrorCode::NotADatabase => "not a sqlite database".to_string(),
                rusqlite::ErrorCode::DatabaseCorrupt => "corrupt sqlite database".to_string(),
                code => format!(
                    "sqlite preflight failed (code={:?}, extended_code={})",
                    code, sql_err.extended_code
                ),
            };
            MemseeError::IncompatibleStore {
                path: db_path.to_path_buf(),
                reason,
            }
        }
        other => MemseeError::Storage(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_preflight_accepts_fresh_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("heap.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        create_schema(&conn).unwrap();
        drop(conn);

        assert!(preflight(&path).unwrap() > 0);
    }

    #[test]
    fn test_preflight_rejects_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = preflight(&dir.path().join("nope.db")).unwrap_err();
        assert!(matches!(err, MemseeError::IncompatibleStore { .. }));
    }

    #[test]
    fn test_preflight_rejects_non_sqlite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.db");
        std::fs::write(&path, "not a database. ".repeat(64)).unwrap();

        match preflight(&path).unwrap_err() {
            MemseeError::IncompatibleStore { reason, .. } => {
                assert!(reason.contains("not a sqlite database"), "{}", reason)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_preflight_rejects_foreign_sqlite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute("CREATE TABLE t (x INTEGER)", []).unwrap();
        drop(conn);

        match preflight(&path).unwrap_err() {
            MemseeError::IncompatibleStore { reason, .. } => assert!(reason.contains("memsee_meta")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_preflight_rejects_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        create_schema(&conn).unwrap();
        conn.execute("UPDATE memsee_meta SET schema_version = 1 WHERE id = 1", [])
            .unwrap();
        drop(conn);

        match preflight(&path).unwrap_err() {
            MemseeError::IncompatibleStore { reason, .. } => assert!(reason.contains("found=1")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
