//! Graph store: durable, indexed storage of objects and references.
//!
//! One SQLite file holds one session. Objects live in `obj` keyed by a unique
//! `address`; references live in `ref` and are append-only, with no existence
//! check against `obj` (dumps are not topologically sorted, so a child may
//! arrive after its parent or never).
//!
//! # Batch discipline
//!
//! Writes happen between [`GraphStore::begin_batch`] and
//! [`GraphStore::commit_batch`]. The store never auto-commits individual rows
//! and never holds one transaction for a whole dump. Readers use their own
//! connections and therefore only ever observe committed batches.

pub mod claim;
pub mod schema;

pub use claim::WriterClaim;
pub use schema::{create_schema, preflight, SCHEMA_VERSION};

use rusqlite::backup::Progress;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, DatabaseName, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::diagnostics::FieldConflict;
use crate::dump::ObjectRecord;
use crate::error::{MemseeError, QueryError, Result};
use crate::Address;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Convert an unsigned address, size or count to a SQLite integer.
///
/// SQLite integers are signed 64-bit; anything above `i64::MAX` is rejected
/// rather than wrapped.
pub(crate) fn sql_int(what: &str, n: u64) -> std::result::Result<i64, QueryError> {
    i64::try_from(n).map_err(|_| QueryError::OutOfRange(format!("{} {}", what, n)))
}

const OBJECT_COLUMNS: &str = "seq, address, type, name, value, size, len, repr, top, mark";

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRow {
    /// Insertion order
    pub seq: i64,
    pub address: Address,
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: Option<String>,
    pub value: Option<String>,
    pub size: u64,
    pub len: Option<i64>,
    pub repr: Option<String>,
    pub top: bool,
    /// `None` until the marker has run
    pub marked: Option<bool>,
}

/// A stored reference. `child` may name an object that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRow {
    pub seq: i64,
    pub parent: Address,
    pub child: Address,
    pub label: Option<String>,
}

/// Pushdown filter for [`GraphStore::iter_objects`]. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectFilter {
    pub address: Option<Address>,
    pub type_name: Option<String>,
    pub marked: Option<bool>,
    pub min_size: Option<u64>,
}

impl ObjectFilter {
    pub fn address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn marked(mut self, marked: bool) -> Self {
        self.marked = Some(marked);
        self
    }

    pub fn min_size(mut self, min_size: u64) -> Self {
        self.min_size = Some(min_size);
        self
    }
}

/// Pushdown filter for [`GraphStore::iter_references`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceFilter {
    pub parent: Option<Address>,
    pub child: Option<Address>,
    pub label: Option<String>,
}

impl ReferenceFilter {
    pub fn parent(mut self, parent: Address) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn child(mut self, child: Address) -> Self {
        self.child = Some(child);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Result of [`GraphStore::insert_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// First time this address was seen
    Inserted,
    /// Same address with identical attributes; nothing written
    Unchanged,
    /// Same address with different attributes; the incoming record won
    Replaced(Vec<FieldConflict>),
}

/// Handle on one SQLite connection to a session file.
pub struct GraphStore {
    conn: rusqlite::Connection,
    path: PathBuf,
    trace: Arc<AtomicBool>,
    batch_attempts: usize,
}

impl GraphStore {
    /// Create the schema in a new (or empty) database file and return a writer.
    pub fn create(path: &Path, trace: Arc<AtomicBool>) -> Result<Self> {
        let store = Self::open_writer(path, trace)?;
        create_schema(&store.conn)?;
        Ok(store)
    }

    /// Open the writer connection. The caller is responsible for preflight.
    pub fn open_writer(path: &Path, trace: Arc<AtomicBool>) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            trace,
            batch_attempts: 0,
        })
    }

    /// Open a query-only connection. Sees committed batches only.
    ///
    /// The file is opened read-write so SQLite can attach the WAL index, then
    /// locked down with `query_only`.
    pub fn open_reader(path: &Path, trace: Arc<AtomicBool>) -> Result<Self> {
        let conn = rusqlite::Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA query_only = ON;")?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            trace,
            batch_attempts: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace.load(Ordering::Relaxed)
    }

    pub(crate) fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }

    /// Interrupt handle for cancelling a statement from another thread.
    pub(crate) fn interrupt_handle(&self) -> rusqlite::InterruptHandle {
        self.conn.get_interrupt_handle()
    }

    // ---- batch control ----

    /// Start a write batch.
    pub fn begin_batch(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    /// Commit the open batch.
    ///
    /// Fails with [`MemseeError::CommitFailure`] when no batch is open or
    /// when SQLite refuses the commit; in the latter case the batch is rolled
    /// back so the store is left at the previous batch boundary.
    pub fn commit_batch(&mut self) -> Result<()> {
        let batch = self.batch_attempts;
        self.batch_attempts += 1;

        if self.conn.is_autocommit() {
            return Err(MemseeError::CommitFailure {
                batch,
                reason: "cannot commit - no transaction is active".to_string(),
            });
        }

        if let Err(e) = self.conn.execute_batch("COMMIT") {
            if !self.conn.is_autocommit() {
                let _ = self.conn.execute_batch("ROLLBACK");
            }
            return Err(MemseeError::CommitFailure {
                batch,
                reason: e.to_string(),
            });
        }

        if self.trace_enabled() {
            tracing::info!(target: "memsee::trace", batch, path = %self.path.display(), "commit");
        }
        Ok(())
    }

    /// Discard the open batch. No-op when none is open.
    pub fn rollback_batch(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK")?;
        if self.trace_enabled() {
            tracing::info!(target: "memsee::trace", batch = self.batch_attempts, "rollback");
        }
        Ok(())
    }

    pub fn in_batch(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Restart commit numbering, once per ingestion run.
    pub fn reset_batch_sequence(&mut self) {
        self.batch_attempts = 0;
    }

    // ---- read snapshots ----

    /// Pin this connection to the current committed state.
    ///
    /// Every statement until [`GraphStore::end_snapshot`] sees the same
    /// batches, whatever the writer commits in the meantime.
    pub fn begin_snapshot(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN DEFERRED")?;
        // A deferred transaction takes its snapshot at the first read.
        self.conn
            .query_row("SELECT schema_version FROM memsee_meta", [], |_| Ok(()))?;
        Ok(())
    }

    pub fn end_snapshot(&self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    // ---- backup ----

    /// Copy the whole store to `dest` with SQLite's online backup.
    pub fn backup_to(&self, dest: &Path) -> Result<()> {
        self.conn.backup(DatabaseName::Main, dest, None)?;
        Ok(())
    }

    /// Replace the store's contents with the database at `src`.
    pub fn restore_from(&mut self, src: &Path) -> Result<()> {
        self.conn
            .restore(DatabaseName::Main, src, None::<fn(Progress)>)?;
        Ok(())
    }

    // ---- writes ----

    /// Insert one object, last-write-wins on an existing address.
    ///
    /// Existing objects keep their insertion position and mark.
    pub fn insert_object(&self, record: &ObjectRecord) -> Result<InsertOutcome> {
        let existing = self.get_object(record.address)?;

        let outcome = match existing {
            None => InsertOutcome::Inserted,
            Some(row) => {
                let conflicts = diff_object(&row, record);
                if conflicts.is_empty() {
                    return Ok(InsertOutcome::Unchanged);
                }
                InsertOutcome::Replaced(conflicts)
            }
        };

        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO obj (address, type, name, value, size, len, repr, top)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(address) DO UPDATE SET
                type = excluded.type,
                name = excluded.name,
                value = excluded.value,
                size = excluded.size,
                len = excluded.len,
                repr = excluded.repr,
                top = excluded.top",
        )?;
        stmt.execute(params![
            sql_int("address", record.address)?,
            record.type_name,
            record.name,
            record.value,
            sql_int("size", record.size)?,
            record.len,
            record.repr,
            record.top,
        ])?;

        Ok(outcome)
    }

    /// Append one reference. Never checks that either end exists.
    pub fn insert_reference(&self, parent: Address, child: Address, label: Option<&str>) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO ref (parent, child, label) VALUES (?1, ?2, ?3)")?;
        stmt.execute(params![
            sql_int("address", parent)?,
            sql_int("address", child)?,
            label
        ])?;
        Ok(())
    }

    /// Set or clear the mark on one object. Returns false when no such object.
    pub fn mark(&self, address: Address, flag: bool) -> Result<bool> {
        let n = self.conn.execute(
            "UPDATE obj SET mark = ?1 WHERE address = ?2",
            params![flag, sql_int("address", address)?],
        )?;
        Ok(n > 0)
    }

    /// Bulk variant of [`GraphStore::mark`]. Returns the number of objects updated.
    pub fn mark_many(&self, addresses: &[Address], flag: bool) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare_cached("UPDATE obj SET mark = ?1 WHERE address = ?2")?;
        let mut updated = 0;
        for &address in addresses {
            updated += stmt.execute(params![flag, sql_int("address", address)?])?;
        }
        Ok(updated)
    }

    /// Store a named value, replacing any previous definition.
    pub fn define_name(&self, name: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO env (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![name, value],
        )?;
        Ok(())
    }

    // ---- reads ----

    pub fn get_object(&self, address: Address) -> Result<Option<ObjectRow>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM obj WHERE address = ?1",
            OBJECT_COLUMNS
        ))?;
        Ok(stmt
            .query_row(params![sql_int("address", address)?], object_from_row)
            .optional()?)
    }

    /// Visit objects in insertion order. The visitor returns false to stop.
    ///
    /// Returns the number of objects visited.
    pub fn iter_objects<F>(&self, filter: &ObjectFilter, mut visit: F) -> Result<usize>
    where
        F: FnMut(&ObjectRow) -> bool,
    {
        let mut clauses = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(address) = filter.address {
            args.push(SqlValue::Integer(sql_int("address", address)?));
            clauses.push(format!("address = ?{}", args.len()));
        }
        if let Some(type_name) = &filter.type_name {
            args.push(SqlValue::Text(type_name.clone()));
            clauses.push(format!("type = ?{}", args.len()));
        }
        if let Some(marked) = filter.marked {
            args.push(SqlValue::Integer(marked as i64));
            clauses.push(format!("mark = ?{}", args.len()));
        }
        if let Some(min_size) = filter.min_size {
            args.push(SqlValue::Integer(sql_int("size", min_size)?));
            clauses.push(format!("size >= ?{}", args.len()));
        }

        let sql = format!(
            "SELECT {} FROM obj{} ORDER BY seq",
            OBJECT_COLUMNS,
            where_clause(&clauses)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args))?;

        let mut visited = 0;
        while let Some(row) = rows.next()? {
            let object = object_from_row(row)?;
            visited += 1;
            if !visit(&object) {
                break;
            }
        }
        Ok(visited)
    }

    /// Visit references in insertion order. The visitor returns false to stop.
    pub fn iter_references<F>(&self, filter: &ReferenceFilter, mut visit: F) -> Result<usize>
    where
        F: FnMut(&ReferenceRow) -> bool,
    {
        let mut clauses = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(parent) = filter.parent {
            args.push(SqlValue::Integer(sql_int("address", parent)?));
            clauses.push(format!("parent = ?{}", args.len()));
        }
        if let Some(child) = filter.child {
            args.push(SqlValue::Integer(sql_int("address", child)?));
            clauses.push(format!("child = ?{}", args.len()));
        }
        if let Some(label) = &filter.label {
            args.push(SqlValue::Text(label.clone()));
            clauses.push(format!("label = ?{}", args.len()));
        }

        let sql = format!(
            "SELECT seq, parent, child, label FROM ref{} ORDER BY seq",
            where_clause(&clauses)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args))?;

        let mut visited = 0;
        while let Some(row) = rows.next()? {
            let reference = ReferenceRow {
                seq: row.get(0)?,
                parent: row.get::<_, i64>(1)? as Address,
                child: row.get::<_, i64>(2)? as Address,
                label: row.get(3)?,
            };
            visited += 1;
            if !visit(&reference) {
                break;
            }
        }
        Ok(visited)
    }

    pub fn count_objects(&self) -> Result<u64> {
        self.count("SELECT count(*) FROM obj")
    }

    pub fn count_references(&self) -> Result<u64> {
        self.count("SELECT count(*) FROM ref")
    }

    pub fn count_marked(&self) -> Result<u64> {
        self.count("SELECT count(*) FROM obj WHERE mark = 1")
    }

    pub fn total_bytes(&self) -> Result<u64> {
        self.count("SELECT coalesce(sum(size), 0) FROM obj")
    }

    /// All named values, ordered by name.
    pub fn names(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, value FROM env ORDER BY name")?;
        let names = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    pub fn lookup_name(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM env WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn count(&self, sql: &str) -> Result<u64> {
        let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

fn where_clause(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

pub(crate) fn object_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ObjectRow> {
    Ok(ObjectRow {
        seq: row.get(0)?,
        address: row.get::<_, i64>(1)? as Address,
        type_name: row.get(2)?,
        name: row.get(3)?,
        value: row.get(4)?,
        size: row.get::<_, i64>(5)? as u64,
        len: row.get(6)?,
        repr: row.get(7)?,
        top: row.get(8)?,
        marked: row.get(9)?,
    })
}

/// Fields of `incoming` that differ from the stored row.
fn diff_object(stored: &ObjectRow, incoming: &ObjectRecord) -> Vec<FieldConflict> {
    fn show<T: ToString>(v: &Option<T>) -> String {
        v.as_ref().map_or_else(|| "null".to_string(), |v| v.to_string())
    }

    let mut conflicts = Vec::new();
    let mut check = |field: &str, previous: String, incoming: String| {
        if previous != incoming {
            conflicts.push(FieldConflict {
                field: field.to_string(),
                previous,
                incoming,
            });
        }
    };

    check("type", stored.type_name.clone(), incoming.type_name.clone());
    check("size", stored.size.to_string(), incoming.size.to_string());
    check("len", show(&stored.len), show(&incoming.len));
    check("name", show(&stored.name), show(&incoming.name));
    check("value", show(&stored.value), show(&incoming.value));
    check("top", stored.top.to_string(), incoming.top.to_string());
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_store(dir: &TempDir) -> GraphStore {
        GraphStore::create(&dir.path().join("heap.db"), Arc::new(AtomicBool::new(false))).unwrap()
    }

    #[test]
    fn test_insert_then_read_back() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);

        store.begin_batch().unwrap();
        let outcome = store
            .insert_object(&ObjectRecord::new(10, "str", 50).with_value("hi"))
            .unwrap();
        store.commit_batch().unwrap();

        assert_eq!(outcome, InsertOutcome::Inserted);
        let row = store.get_object(10).unwrap().unwrap();
        assert_eq!(row.type_name, "str");
        assert_eq!(row.repr.as_deref(), Some("\"hi\""));
        assert_eq!(row.marked, None);
    }

    #[test]
    fn test_duplicate_address_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);

        store.begin_batch().unwrap();
        store.insert_object(&ObjectRecord::new(1, "int", 28)).unwrap();
        let same = store.insert_object(&ObjectRecord::new(1, "int", 28)).unwrap();
        let changed = store.insert_object(&ObjectRecord::new(1, "int", 32)).unwrap();
        store.commit_batch().unwrap();

        assert_eq!(same, InsertOutcome::Unchanged);
        match changed {
            InsertOutcome::Replaced(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].field, "size");
                assert_eq!(conflicts[0].previous, "28");
                assert_eq!(conflicts[0].incoming, "32");
            }
            other => panic!("expected replacement, got {:?}", other),
        }
        assert_eq!(store.get_object(1).unwrap().unwrap().size, 32);
        assert_eq!(store.count_objects().unwrap(), 1);
    }

    #[test]
    fn test_references_keep_multiplicity_and_dangle() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);

        store.begin_batch().unwrap();
        store.insert_reference(5, 99, None).unwrap();
        store.insert_reference(5, 99, Some("slot")).unwrap();
        store.commit_batch().unwrap();

        let mut seen = Vec::new();
        store
            .iter_references(&ReferenceFilter::default().parent(5), |r| {
                seen.push((r.child, r.label.clone()));
                true
            })
            .unwrap();
        assert_eq!(seen, vec![(99, None), (99, Some("slot".to_string()))]);
        assert!(store.get_object(99).unwrap().is_none());
    }

    #[test]
    fn test_commit_without_batch_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);

        match store.commit_batch().unwrap_err() {
            MemseeError::CommitFailure { batch, reason } => {
                assert_eq!(batch, 0);
                assert!(reason.contains("no transaction is active"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_rollback_discards_batch() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);

        store.begin_batch().unwrap();
        store.insert_object(&ObjectRecord::new(1, "int", 28)).unwrap();
        store.rollback_batch().unwrap();
        assert!(!store.in_batch());
        assert_eq!(store.count_objects().unwrap(), 0);

        // No batch open: rollback is a no-op.
        store.rollback_batch().unwrap();
    }

    #[test]
    fn test_iter_objects_pushdown_and_early_stop() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);

        store.begin_batch().unwrap();
        for (address, type_name, size) in [(1, "int", 28), (2, "str", 50), (3, "int", 32)] {
            store
                .insert_object(&ObjectRecord::new(address, type_name, size))
                .unwrap();
        }
        store.commit_batch().unwrap();

        let mut ints = Vec::new();
        store
            .iter_objects(&ObjectFilter::default().type_name("int"), |o| {
                ints.push(o.address);
                true
            })
            .unwrap();
        assert_eq!(ints, vec![1, 3]);

        let visited = store.iter_objects(&ObjectFilter::default(), |_| false).unwrap();
        assert_eq!(visited, 1);

        let mut big = Vec::new();
        store
            .iter_objects(&ObjectFilter::default().min_size(32), |o| {
                big.push(o.address);
                true
            })
            .unwrap();
        assert_eq!(big, vec![2, 3]);
    }

    #[test]
    fn test_mark_many() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);

        store.begin_batch().unwrap();
        store.insert_object(&ObjectRecord::new(1, "int", 28)).unwrap();
        store.insert_object(&ObjectRecord::new(2, "int", 28)).unwrap();
        assert_eq!(store.mark_many(&[1, 2, 3], true).unwrap(), 2);
        assert!(!store.mark(3, true).unwrap());
        store.commit_batch().unwrap();

        assert_eq!(store.count_marked().unwrap(), 2);
    }

    #[test]
    fn test_snapshot_hides_later_commits() {
        let dir = TempDir::new().unwrap();
        let mut writer = new_store(&dir);
        let reader =
            GraphStore::open_reader(&dir.path().join("heap.db"), Arc::new(AtomicBool::new(false)))
                .unwrap();

        writer.begin_batch().unwrap();
        writer.insert_object(&ObjectRecord::new(1, "int", 28)).unwrap();
        writer.commit_batch().unwrap();

        reader.begin_snapshot().unwrap();
        assert_eq!(reader.count_objects().unwrap(), 1);

        writer.begin_batch().unwrap();
        writer.insert_object(&ObjectRecord::new(2, "int", 28)).unwrap();
        writer.insert_reference(2, 1, None).unwrap();
        writer.commit_batch().unwrap();

        assert_eq!(reader.count_objects().unwrap(), 1);
        assert_eq!(reader.count_references().unwrap(), 0);
        reader.end_snapshot().unwrap();

        assert_eq!(reader.count_objects().unwrap(), 2);
        assert_eq!(reader.count_references().unwrap(), 1);
    }

    #[test]
    fn test_values_above_i64_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);

        let too_big = ObjectFilter::default().min_size(u64::MAX);
        match store.iter_objects(&too_big, |_| true).unwrap_err() {
            MemseeError::Query(QueryError::OutOfRange(what)) => {
                assert_eq!(what, format!("size {}", u64::MAX))
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(store.get_object(1 << 63).is_err());

        store.begin_batch().unwrap();
        assert!(store.insert_object(&ObjectRecord::new(1 << 63, "int", 28)).is_err());
        assert!(store.insert_reference(1, u64::MAX, None).is_err());
        store.rollback_batch().unwrap();
        assert_eq!(store.count_references().unwrap(), 0);
    }

    #[test]
    fn test_named_values() {
        let dir = TempDir::new().unwrap();
        let store = new_store(&dir);

        store.define_name("root", "140").unwrap();
        store.define_name("root", "150").unwrap();
        store.define_name("alpha", "1").unwrap();

        assert_eq!(store.lookup_name("root").unwrap().as_deref(), Some("150"));
        assert_eq!(
            store.names().unwrap(),
            vec![
                ("alpha".to_string(), "1".to_string()),
                ("root".to_string(), "150".to_string())
            ]
        );
    }
}
