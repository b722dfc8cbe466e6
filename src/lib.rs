//! memsee: explore heap snapshots with ad-hoc queries
//!
//! memsee ingests an object-graph dump (one JSON object per heap object,
//! each carrying its outgoing references) into a SQLite store, flags root and
//! top objects, and answers relational and graph queries over the result.
//!
//! # Dump format
//!
//! ```text
//! {"address": 125817416, "type": "list", "size": 72, "len": 0, "refs": []}
//! {"address": 140, "type": "str", "size": 50, "value": "hello", "refs": [125817416]}
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use memsee::{query::patterns, IngestOptions, Session};
//!
//! # fn main() -> memsee::Result<()> {
//! let session = Session::create("heap.db")?;
//! let dump = std::path::Path::new("heap.json");
//! let report = memsee::ingest_file(&session, dump, &IngestOptions::default(), None)?;
//! println!("loaded {} objects, {} refs", report.objects_loaded, report.references_loaded);
//!
//! for row in session.query(&patterns::count_by_type())?.rows {
//!     println!("{:?} {:?}", row.get("type"), row.get("n"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! One writer per session (ingestion, marking, pinning, name definitions);
//! a second writer fails with [`MemseeError::SessionBusy`]. Queries open their
//! own connections and only ever see committed batches.

pub mod cancel;
pub mod common;
pub mod diagnostics;
pub mod dump;
pub mod error;
pub mod error_codes;
pub mod ingest;
pub mod marker;
pub mod output;
pub mod query;
pub mod session;
pub mod store;
pub mod version;

/// Process-relative object identity at capture time.
pub type Address = u64;

pub use cancel::CancelToken;
pub use diagnostics::{DataQualityWarning, FailedBatch, FieldConflict, IngestDiagnostic};
pub use dump::{DumpReader, ObjectRecord};
pub use error::{MemseeError, ParseError, QueryError, Result};
pub use ingest::{
    ingest, ingest_file, ingest_records, ingest_with_progress, FailPoint, IngestOptions,
    IngestProgress, IngestState, IngestionReport, DEFAULT_BATCH_SIZE,
};
pub use marker::MarkReport;
pub use output::OutputFormat;
pub use query::{
    Direction, Expr, Query, QueryOptions, Relation, ResultSet, Row, Value, QUERY_ROW_BATCH,
};
pub use session::{CreateMode, Session, SessionStats};
pub use store::{GraphStore, ObjectFilter, ObjectRow, ReferenceFilter, ReferenceRow, SCHEMA_VERSION};

/// Create a new session at `path`.
pub fn create<P: AsRef<std::path::Path>>(path: P) -> Result<Session> {
    Session::create(path)
}

/// Open an existing session at `path`.
pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Session> {
    Session::open(path)
}

/// Run `query` against `session`.
pub fn query(session: &Session, query: &Query) -> Result<ResultSet> {
    session.query(query)
}

/// Toggle trace output for every query and commit issued through `session`.
pub fn set_trace(session: &Session, enabled: bool) {
    session.set_trace(enabled)
}
