//! Ingestion engine: streams dump records into the graph store in batches.
//!
//! # State machine
//!
//! ```text
//! Idle -> Reading -> Committing(k) -> Reading -> ... -> MarkingTop -> Idle
//!            \______________\__________________________________-> Failed
//! ```
//!
//! Records are written into an open batch; every `batch_size` objects the
//! batch is committed. A commit that fails after an earlier batch landed is
//! recorded as a [`FailedBatch`] and the run continues with the next batch.
//! A failure of the very first commit, an I/O error, or (in strict mode) the
//! first malformed record or conflicting duplicate ends the run in `Failed`.
//!
//! # Memory
//! The engine holds one record at a time plus per-batch tallies; the open
//! batch itself lives in SQLite.

pub mod log;

use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::diagnostics::{DataQualityWarning, FailedBatch, IngestDiagnostic};
use crate::dump::{DumpReader, ObjectRecord};
use crate::error::{MemseeError, ParseError, Result};
use crate::marker;
use crate::session::Session;
use crate::store::{GraphStore, InsertOutcome};

/// Objects per batch unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 5_000;

/// Per-kind cap on diagnostic details kept in a report. Counts stay exact.
pub const MAX_RECORDED_DETAILS: usize = 1_000;

/// Progress callback, invoked at every commit boundary and checkpoint.
///
/// The callback may borrow from the caller's stack for the duration of the run.
pub type IngestProgressFn<'a> = dyn Fn(&IngestProgress) + 'a;

/// Ingestion engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestState {
    Idle,
    Reading,
    Committing { batch: usize },
    MarkingTop,
    Failed,
}

/// Fault injection for exercising batch isolation in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// Roll back batch `i` just before its commit, so the commit finds no
    /// active transaction.
    CommitBatch(usize),
}

/// Ingestion configuration.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Objects per batch (minimum 1)
    pub batch_size: usize,
    /// Abort on the first malformed record or conflicting duplicate
    pub strict: bool,
    /// Extra progress checkpoint every N records; `None` reports at commits only
    pub progress_every: Option<u64>,
    /// Run the top/root marker after the stream ends
    pub mark_top: bool,
    pub cancel: CancelToken,
    /// Label recorded in the run log
    pub source: String,
    pub fail_point: Option<FailPoint>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            strict: false,
            progress_every: None,
            mark_top: true,
            cancel: CancelToken::new(),
            source: "<stream>".to_string(),
            fail_point: None,
        }
    }
}

impl IngestOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_progress_every(mut self, records: u64) -> Self {
        self.progress_every = Some(records);
        self
    }

    pub fn without_marking(mut self) -> Self {
        self.mark_top = false;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_fail_point(mut self, fail_point: FailPoint) -> Self {
        self.fail_point = Some(fail_point);
        self
    }
}

/// Snapshot handed to the progress callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestProgress {
    pub state: IngestState,
    /// Non-blank records read so far, malformed ones included
    pub records_read: u64,
    /// Committed totals
    pub objects_loaded: u64,
    pub references_loaded: u64,
    pub batches_committed: usize,
    pub elapsed: Duration,
}

/// Outcome of one ingestion run.
///
/// `objects_loaded`, `references_loaded` and `total_bytes` count committed
/// rows only: records in a failed, rolled back or cancelled batch are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub run_id: String,
    pub records_read: u64,
    pub objects_loaded: u64,
    pub references_loaded: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
    pub batches_committed: usize,
    pub failed_batches: Vec<FailedBatch>,
    pub parse_error_count: u64,
    pub parse_errors: Vec<ParseError>,
    pub warning_count: u64,
    pub warnings: Vec<DataQualityWarning>,
    /// Objects flagged by the marker; `None` when marking did not run
    pub roots_marked: Option<u64>,
    pub cancelled: bool,
}

impl IngestionReport {
    /// All recorded diagnostics in deterministic order.
    pub fn diagnostics(&self) -> Vec<IngestDiagnostic> {
        let mut all: Vec<IngestDiagnostic> = self
            .failed_batches
            .iter()
            .cloned()
            .map(IngestDiagnostic::BatchLost)
            .chain(self.parse_errors.iter().cloned().map(IngestDiagnostic::Malformed))
            .chain(self.warnings.iter().cloned().map(IngestDiagnostic::Conflict))
            .collect();
        all.sort();
        all
    }

    /// True when every record read landed in the store.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed_batches.is_empty() && self.parse_error_count == 0
    }

    fn outcome(&self) -> &'static str {
        if self.cancelled {
            "cancelled"
        } else if self.is_complete() {
            "completed"
        } else {
            "partial"
        }
    }
}

/// Ingest a JSON-lines dump stream into `session`.
pub fn ingest<R: BufRead>(
    session: &Session,
    input: R,
    options: &IngestOptions,
) -> Result<IngestionReport> {
    ingest_with_progress(session, input, options, None)
}

/// [`ingest`] with a progress callback.
pub fn ingest_with_progress<R: BufRead>(
    session: &Session,
    input: R,
    options: &IngestOptions,
    progress: Option<&IngestProgressFn<'_>>,
) -> Result<IngestionReport> {
    ingest_records(session, DumpReader::new(input), options, progress)
}

/// Ingest a dump file. The run log records the file path as its source.
pub fn ingest_file(
    session: &Session,
    path: &Path,
    options: &IngestOptions,
    progress: Option<&IngestProgressFn<'_>>,
) -> Result<IngestionReport> {
    let reader = DumpReader::open(path)?;
    let options = options.clone().with_source(path.display().to_string());
    ingest_records(session, reader, &options, progress)
}

/// Ingest an already-decoded record sequence.
///
/// Fails fast with [`MemseeError::SessionBusy`] when another writer holds
/// the session.
pub fn ingest_records<I>(
    session: &Session,
    records: I,
    options: &IngestOptions,
    progress: Option<&IngestProgressFn<'_>>,
) -> Result<IngestionReport>
where
    I: IntoIterator<Item = Result<ObjectRecord>>,
{
    let mut guard = session.writer()?;
    let store: &mut GraphStore = &mut guard;
    store.reset_batch_sequence();

    let run_id = log::generate_run_id();
    session.ingest_log().start_run(&run_id, &options.source)?;
    tracing::debug!(run_id = %run_id, source = %options.source, "ingestion started");

    let mut engine = Engine::new(store, options, progress, run_id.clone());
    let result = engine.run(records);

    if result.is_err() {
        engine.abort();
    }
    let mut report = engine.finish();

    let outcome = if result.is_err() { "failed" } else { report.outcome() };
    if let Err(e) = session.ingest_log().finish_run(
        &run_id,
        outcome,
        report.elapsed.as_millis() as u64,
        report.objects_loaded,
        report.references_loaded,
        &report.failed_batches,
    ) {
        tracing::warn!(run_id = %run_id, "could not record ingestion outcome: {}", e);
    }

    result?;
    report.run_id = run_id;

    tracing::info!(
        "ingested {} objects and {} references totalling {} bytes ({:.1}s)",
        report.objects_loaded,
        report.references_loaded,
        report.total_bytes,
        report.elapsed.as_secs_f64()
    );
    Ok(report)
}

/// Tallies for the batch currently being written.
#[derive(Debug, Default)]
struct BatchTally {
    index: usize,
    first_record: Option<u64>,
    last_record: u64,
    objects: u64,
    references: u64,
    bytes: u64,
}

impl BatchTally {
    fn starting(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    fn failed(&self, reason: String) -> FailedBatch {
        FailedBatch {
            index: self.index,
            first_record: self.first_record.unwrap_or(self.last_record),
            last_record: self.last_record,
            objects: self.objects as usize,
            references: self.references as usize,
            reason,
        }
    }
}

struct Engine<'a> {
    store: &'a mut GraphStore,
    options: &'a IngestOptions,
    progress: Option<&'a IngestProgressFn<'a>>,
    state: IngestState,
    started: Instant,
    batch: BatchTally,
    report: IngestionReport,
}

impl<'a> Engine<'a> {
    fn new(
        store: &'a mut GraphStore,
        options: &'a IngestOptions,
        progress: Option<&'a IngestProgressFn<'a>>,
        run_id: String,
    ) -> Self {
        Self {
            store,
            options,
            progress,
            state: IngestState::Idle,
            started: Instant::now(),
            batch: BatchTally::starting(0),
            report: IngestionReport {
                run_id,
                ..IngestionReport::default()
            },
        }
    }

    fn batch_size(&self) -> u64 {
        self.options.batch_size.max(1) as u64
    }

    fn transition(&mut self, next: IngestState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "ingest state");
            self.state = next;
        }
    }

    fn run<I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<ObjectRecord>>,
    {
        self.transition(IngestState::Reading);

        for item in records {
            if self.options.cancel.is_cancelled() {
                return self.cancel();
            }

            self.report.records_read += 1;
            match item {
                Ok(record) => self.load(record)?,
                Err(MemseeError::Parse(e)) => self.skip(e)?,
                Err(e) => return Err(e),
            }

            let committed = if self.batch.objects >= self.batch_size() {
                self.commit()?;
                true
            } else {
                false
            };

            if let Some(every) = self.options.progress_every.filter(|&n| n > 0) {
                if !committed && self.report.records_read % every == 0 {
                    self.emit_progress();
                }
            }
        }

        if self.options.cancel.is_cancelled() {
            return self.cancel();
        }
        if self.store.in_batch() || self.batch.objects > 0 {
            self.commit()?;
        }

        if self.options.mark_top {
            self.transition(IngestState::MarkingTop);
            self.store.begin_batch()?;
            let marked = marker::mark_top_objects(self.store)?;
            self.store.commit_batch()?;
            tracing::info!("marked {} top objects", marked.marked);
            self.report.roots_marked = Some(marked.marked);
        }

        self.transition(IngestState::Idle);
        Ok(())
    }

    fn load(&mut self, record: ObjectRecord) -> Result<()> {
        if !self.store.in_batch() {
            self.store.begin_batch()?;
        }

        if let InsertOutcome::Replaced(conflicts) = self.store.insert_object(&record)? {
            let warning = DataQualityWarning {
                record: record.record,
                address: record.address,
                conflicts,
            };
            if self.options.strict {
                return Err(MemseeError::DataQuality(warning));
            }
            tracing::warn!("{}", warning);
            self.report.warning_count += 1;
            if self.report.warnings.len() < MAX_RECORDED_DETAILS {
                self.report.warnings.push(warning);
            }
        }

        for edge in &record.refs {
            self.store
                .insert_reference(record.address, edge.child, edge.label.as_deref())?;
        }

        if self.batch.first_record.is_none() {
            self.batch.first_record = Some(record.record);
        }
        self.batch.last_record = record.record;
        self.batch.objects += 1;
        self.batch.references += record.refs.len() as u64;
        self.batch.bytes += record.size;
        Ok(())
    }

    fn skip(&mut self, error: ParseError) -> Result<()> {
        if self.options.strict {
            return Err(MemseeError::Parse(error));
        }
        tracing::warn!("{}", error);
        self.report.parse_error_count += 1;
        if self.report.parse_errors.len() < MAX_RECORDED_DETAILS {
            self.report.parse_errors.push(error);
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let index = self.batch.index;
        self.transition(IngestState::Committing { batch: index });

        if self.options.fail_point == Some(FailPoint::CommitBatch(index)) {
            self.store.rollback_batch()?;
        }

        match self.store.commit_batch() {
            Ok(()) => {
                self.report.batches_committed += 1;
                self.report.objects_loaded += self.batch.objects;
                self.report.references_loaded += self.batch.references;
                self.report.total_bytes += self.batch.bytes;
                self.emit_progress();
            }
            Err(MemseeError::CommitFailure { reason, .. }) => {
                if self.report.batches_committed == 0 {
                    return Err(MemseeError::CommitFailure {
                        batch: index,
                        reason,
                    });
                }
                let failed = self.batch.failed(reason);
                tracing::warn!("{}", IngestDiagnostic::BatchLost(failed.clone()));
                self.report.failed_batches.push(failed);
            }
            Err(e) => return Err(e),
        }

        self.batch = BatchTally::starting(index + 1);
        self.transition(IngestState::Reading);
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        self.store.rollback_batch()?;
        self.report.cancelled = true;
        tracing::info!(
            batch = self.batch.index,
            "ingestion cancelled; open batch rolled back"
        );
        self.transition(IngestState::Idle);
        Ok(())
    }

    /// Roll back whatever is open after an error and enter `Failed`.
    fn abort(&mut self) {
        if let Err(e) = self.store.rollback_batch() {
            tracing::warn!("rollback after failed ingestion: {}", e);
        }
        self.transition(IngestState::Failed);
    }

    fn emit_progress(&self) {
        tracing::info!(
            "loaded {} objects, {} refs",
            self.report.objects_loaded,
            self.report.references_loaded
        );
        if let Some(cb) = self.progress {
            cb(&IngestProgress {
                state: self.state,
                records_read: self.report.records_read,
                objects_loaded: self.report.objects_loaded,
                references_loaded: self.report.references_loaded,
                batches_committed: self.report.batches_committed,
                elapsed: self.started.elapsed(),
            });
        }
    }

    fn finish(self) -> IngestionReport {
        let mut report = self.report;
        report.elapsed = self.started.elapsed();
        report
    }
}
