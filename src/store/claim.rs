//! Store-wide writer claim.
//!
//! At most one writer per store file. Handles in this process are tracked in
//! a registry keyed by the canonical store path; other processes are kept out
//! by an exclusive transaction held on the `-writer` companion database for as
//! long as the claim lives. SQLite drops that lock when its holder exits, so a
//! crashed writer never leaves a stale claim behind.

use rusqlite::{Connection, ErrorCode};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

use crate::error::{MemseeError, Result};

const COMPANION_SUFFIX: &str = "-writer";

static CLAIMED: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();

fn claimed() -> &'static Mutex<HashSet<PathBuf>> {
    CLAIMED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Path of the lock database that guards writers of `store`.
pub fn companion_path(store: &Path) -> PathBuf {
    let mut name = store.as_os_str().to_os_string();
    name.push(COMPANION_SUFFIX);
    PathBuf::from(name)
}

/// Held while one handle writes to a store. Released on drop.
#[derive(Debug)]
pub struct WriterClaim {
    key: PathBuf,
    lock: Option<Connection>,
}

impl WriterClaim {
    /// Claim the store at `path` without waiting.
    ///
    /// Fails with [`MemseeError::SessionBusy`] when another handle, in this
    /// process or another, holds the claim.
    pub fn acquire(path: &Path) -> Result<Self> {
        let key = std::fs::canonicalize(path)?;
        let busy = || MemseeError::SessionBusy {
            path: path.to_path_buf(),
        };

        let inserted = claimed()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        if !inserted {
            return Err(busy());
        }

        // Dropping `claim` on any early return clears the registry entry.
        let mut claim = Self { key, lock: None };
        match lock_companion(&companion_path(&claim.key))? {
            Some(conn) => {
                claim.lock = Some(conn);
                tracing::debug!(path = %path.display(), "writer claimed");
                Ok(claim)
            }
            None => Err(busy()),
        }
    }
}

impl Drop for WriterClaim {
    fn drop(&mut self) {
        // Closing the connection rolls back and releases the file lock.
        drop(self.lock.take());
        claimed()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Take an exclusive lock on the companion database. `None` when held elsewhere.
fn lock_companion(path: &Path) -> Result<Option<Connection>> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::ZERO)?;
    match conn.execute_batch("BEGIN EXCLUSIVE") {
        Ok(()) => Ok(Some(conn)),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("heap.db");
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_claim_is_exclusive_per_store() {
        let dir = TempDir::new().unwrap();
        let path = store_file(&dir);

        let first = WriterClaim::acquire(&path).unwrap();
        let err = WriterClaim::acquire(&path).unwrap_err();
        assert!(matches!(err, MemseeError::SessionBusy { .. }));

        // Same file through a different spelling
        let dotted = dir.path().join(".").join("heap.db");
        assert!(matches!(
            WriterClaim::acquire(&dotted),
            Err(MemseeError::SessionBusy { .. })
        ));

        drop(first);
        WriterClaim::acquire(&dotted).unwrap();
    }

    #[test]
    fn test_claims_on_different_stores_are_independent() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();

        let _first = WriterClaim::acquire(&store_file(&a)).unwrap();
        let _second = WriterClaim::acquire(&store_file(&b)).unwrap();
    }

    #[test]
    fn test_lock_held_by_another_connection_is_busy() {
        let dir = TempDir::new().unwrap();
        let path = store_file(&dir);

        // Stands in for a writer in another process.
        let foreign = Connection::open(companion_path(&path)).unwrap();
        foreign.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let err = WriterClaim::acquire(&path).unwrap_err();
        assert!(matches!(err, MemseeError::SessionBusy { .. }));

        foreign.execute_batch("COMMIT").unwrap();
        WriterClaim::acquire(&path).unwrap();
    }

    #[test]
    fn test_companion_path() {
        assert_eq!(
            companion_path(Path::new("/tmp/heap.db")),
            PathBuf::from("/tmp/heap.db-writer")
        );
    }
}
