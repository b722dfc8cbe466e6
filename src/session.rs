//! Session: a handle bound to one persistent store file.
//!
//! The session owns a writer connection. Ingestion, marking, pinning, name
//! definitions and backup/restore take it without waiting, together with the
//! store-wide [`WriterClaim`], so a second writer fails fast with
//! [`MemseeError::SessionBusy`] whether it comes through a clone of this
//! handle, another handle on the same file or another process.
//! Queries and traversals open their own reader connection and may run
//! concurrently with each other and with an ingestion in progress; reads made
//! of several statements run inside one snapshot.

use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use crate::error::{MemseeError, Result};
use crate::ingest::log::{IngestLog, IngestRunRecord};
use crate::marker::{self, MarkReport};
use crate::query::exec::{self, QueryOptions};
use crate::query::traverse::{self, AncestorTypeCount, Direction, SubtreeEntry};
use crate::query::{Expr, Query, ResultSet};
use crate::store::{self, GraphStore, ObjectRow, WriterClaim};
use crate::Address;

/// What `create` does when the target path already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CreateMode {
    /// Refuse with [`MemseeError::SessionExists`]
    #[default]
    FailIfExists,
    /// Delete the existing store (and its WAL companions) first
    Truncate,
}

/// Aggregate counts for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub objects: u64,
    pub references: u64,
    pub total_bytes: u64,
    /// Objects currently flagged by the marker
    pub roots: u64,
}

struct SessionInner {
    path: PathBuf,
    writer: Mutex<GraphStore>,
    trace: Arc<AtomicBool>,
    log: IngestLog,
}

/// Exclusive write access to a store, released on drop.
pub(crate) struct WriterGuard<'a> {
    store: MutexGuard<'a, GraphStore>,
    _claim: WriterClaim,
}

impl Deref for WriterGuard<'_> {
    type Target = GraphStore;

    fn deref(&self) -> &GraphStore {
        &self.store
    }
}

impl DerefMut for WriterGuard<'_> {
    fn deref_mut(&mut self) -> &mut GraphStore {
        &mut self.store
    }
}

/// Handle on a persistent store. Cheap to clone; clones share the writer.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.inner.path)
            .field("trace", &self.trace_enabled())
            .finish()
    }
}

impl Session {
    /// Create a new store at `path`; fails if anything already exists there.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with(path, CreateMode::FailIfExists)
    }

    pub fn create_with<P: AsRef<Path>>(path: P, mode: CreateMode) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            match mode {
                CreateMode::FailIfExists => {
                    return Err(MemseeError::SessionExists {
                        path: path.to_path_buf(),
                    })
                }
                CreateMode::Truncate => {
                    let _claim = WriterClaim::acquire(path)?;
                    tracing::info!(path = %path.display(), "truncating existing store");
                    remove_store_files(path)?;
                }
            }
        }

        let trace = Arc::new(AtomicBool::new(false));
        let writer = GraphStore::create(path, Arc::clone(&trace))?;
        tracing::debug!(path = %path.display(), "created store");
        Ok(Self::from_parts(path, writer, trace))
    }

    /// Open an existing store after a read-only compatibility preflight.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        store::preflight(path)?;

        let trace = Arc::new(AtomicBool::new(false));
        let writer = GraphStore::open_writer(path, Arc::clone(&trace))?;
        tracing::debug!(path = %path.display(), "opened store");
        Ok(Self::from_parts(path, writer, trace))
    }

    fn from_parts(path: &Path, writer: GraphStore, trace: Arc<AtomicBool>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                path: path.to_path_buf(),
                writer: Mutex::new(writer),
                trace,
                log: IngestLog::new(path),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Toggle trace mode. Purely additive: results never change.
    pub fn set_trace(&self, enabled: bool) {
        self.inner.trace.store(enabled, Ordering::Relaxed);
        tracing::debug!(enabled, "trace mode");
    }

    pub fn trace_enabled(&self) -> bool {
        self.inner.trace.load(Ordering::Relaxed)
    }

    /// Take the writer and the store-wide claim without waiting.
    pub(crate) fn writer(&self) -> Result<WriterGuard<'_>> {
        let store = match self.inner.writer.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(MemseeError::SessionBusy {
                    path: self.inner.path.clone(),
                })
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                // A writer panicked mid-batch; discard whatever it left open.
                let mut guard = poisoned.into_inner();
                guard.rollback_batch()?;
                self.inner.writer.clear_poison();
                guard
            }
        };
        let claim = WriterClaim::acquire(&self.inner.path)?;
        Ok(WriterGuard {
            store,
            _claim: claim,
        })
    }

    /// Open a fresh reader connection.
    pub(crate) fn reader(&self) -> Result<GraphStore> {
        GraphStore::open_reader(&self.inner.path, Arc::clone(&self.inner.trace))
    }

    /// Run `read` on a fresh reader pinned to one committed state.
    fn snapshot<T>(&self, read: impl FnOnce(&GraphStore) -> Result<T>) -> Result<T> {
        let reader = self.reader()?;
        reader.begin_snapshot()?;
        let value = read(&reader)?;
        reader.end_snapshot()?;
        Ok(value)
    }

    pub(crate) fn ingest_log(&self) -> &IngestLog {
        &self.inner.log
    }

    pub fn stats(&self) -> Result<SessionStats> {
        self.snapshot(|reader| {
            Ok(SessionStats {
                objects: reader.count_objects()?,
                references: reader.count_references()?,
                total_bytes: reader.total_bytes()?,
                roots: reader.count_marked()?,
            })
        })
    }

    /// Persist a named value.
    pub fn define_name(&self, name: &str, value: &str) -> Result<()> {
        crate::query::compile::validate_identifier(name)?;
        self.writer()?.define_name(name, value)
    }

    pub fn names(&self) -> Result<Vec<(String, String)>> {
        self.reader()?.names()
    }

    pub fn lookup_name(&self, name: &str) -> Result<Option<String>> {
        self.reader()?.lookup_name(name)
    }

    /// Recompute root/top marks in one batch.
    pub fn mark_top(&self) -> Result<MarkReport> {
        self.write_batch(marker::mark_top_objects)
    }

    /// Designate objects matching `predicate` as top. Returns how many matched.
    pub fn pin(&self, predicate: &Expr) -> Result<u64> {
        self.write_batch(|store| marker::pin_objects(store, predicate))
    }

    fn write_batch<T>(&self, f: impl FnOnce(&GraphStore) -> Result<T>) -> Result<T> {
        let mut store = self.writer()?;
        store.begin_batch()?;
        match f(&*store) {
            Ok(value) => {
                store.commit_batch()?;
                Ok(value)
            }
            Err(e) => {
                store.rollback_batch()?;
                Err(e)
            }
        }
    }

    pub fn query(&self, query: &Query) -> Result<ResultSet> {
        self.query_with(query, &QueryOptions::default())
    }

    pub fn query_with(&self, query: &Query, options: &QueryOptions) -> Result<ResultSet> {
        exec::execute(&self.reader()?, query, options)
    }

    pub fn object(&self, address: Address) -> Result<Option<ObjectRow>> {
        traverse::object(&self.reader()?, address)
    }

    pub fn parents(&self, address: Address) -> Result<Vec<ObjectRow>> {
        traverse::parents(&self.reader()?, address)
    }

    pub fn children(&self, address: Address) -> Result<Vec<ObjectRow>> {
        traverse::children(&self.reader()?, address)
    }

    pub fn reachable(
        &self,
        start: Address,
        direction: Direction,
        max_depth: Option<usize>,
        options: &QueryOptions,
    ) -> Result<Vec<(Address, usize)>> {
        self.snapshot(|reader| traverse::reachable(reader, start, direction, max_depth, options))
    }

    pub fn shortest_paths(
        &self,
        from: Address,
        targets: &[Address],
        direction: Direction,
        options: &QueryOptions,
    ) -> Result<Vec<Vec<Address>>> {
        self.snapshot(|reader| traverse::shortest_paths(reader, from, targets, direction, options))
    }

    pub fn ancestor_types(
        &self,
        predicate: &Expr,
        options: &QueryOptions,
    ) -> Result<Vec<AncestorTypeCount>> {
        self.snapshot(|reader| traverse::ancestor_types(reader, predicate, options))
    }

    pub fn owned_subtree(&self, address: Address, options: &QueryOptions) -> Result<Vec<SubtreeEntry>> {
        self.snapshot(|reader| traverse::owned_subtree(reader, address, options))
    }

    /// Past ingestion runs, most recent first.
    pub fn ingest_history(&self, limit: Option<usize>) -> Result<Vec<IngestRunRecord>> {
        self.inner.log.list(limit)
    }

    /// Where the one-level backup of this store lives: `<path>.bak`.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.inner.path.as_os_str().to_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Copy the store to [`Session::backup_path`].
    ///
    /// Only one level is kept: refuses with [`MemseeError::BackupExists`]
    /// when a backup is already there.
    pub fn backup(&self) -> Result<PathBuf> {
        let dest = self.backup_path();
        if dest.exists() {
            return Err(MemseeError::BackupExists { path: dest });
        }
        self.writer()?.backup_to(&dest)?;
        tracing::info!(backup = %dest.display(), "store backed up");
        Ok(dest)
    }

    /// Replace the store's contents with its backup. The backup is kept.
    pub fn restore(&self) -> Result<PathBuf> {
        let src = self.backup_path();
        if !src.exists() {
            return Err(MemseeError::NoBackup { path: src });
        }
        store::preflight(&src)?;
        self.writer()?.restore_from(&src)?;
        tracing::info!(backup = %src.display(), "store restored");
        Ok(src)
    }
}

fn remove_store_files(path: &Path) -> Result<()> {
    let mut companions = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        companions.push(PathBuf::from(name));
    }

    for file in companions {
        match std::fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
