//! Query execution against a reader connection.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::error::{MemseeError, QueryError, Result};
use crate::store::GraphStore;

use super::compile::{compile, CompiledQuery};
use super::expr::Query;
use super::result::{ResultSet, Row, Value};

/// Rows fetched between cancellation checkpoints.
pub const QUERY_ROW_BATCH: usize = 256;

/// Poll interval of the interrupt watchdog.
const WATCHDOG_TICK: Duration = Duration::from_millis(50);

/// Per-call execution controls.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub cancel: Option<CancelToken>,
    /// Wall-clock budget; exceeded budgets fail with `QueryCancelled`
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn deadline(&self, started: Instant) -> Option<Instant> {
        self.timeout.map(|t| started + t)
    }

    /// Fail with `QueryCancelled` if cancellation was requested or the deadline passed.
    pub(crate) fn checkpoint(&self, deadline: Option<Instant>) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(MemseeError::QueryCancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(MemseeError::QueryCancelled);
        }
        Ok(())
    }

    fn needs_watchdog(&self) -> bool {
        self.cancel.is_some() || self.timeout.is_some()
    }
}

/// Validate, compile and run `query`.
pub fn execute(store: &GraphStore, query: &Query, options: &QueryOptions) -> Result<ResultSet> {
    let compiled = compile(query)?;
    run_compiled(store, &compiled, options)
}

pub(crate) fn run_compiled(
    store: &GraphStore,
    compiled: &CompiledQuery,
    options: &QueryOptions,
) -> Result<ResultSet> {
    let started = Instant::now();
    let deadline = options.deadline(started);
    options.checkpoint(deadline)?;

    let watchdog = options
        .needs_watchdog()
        .then(|| Watchdog::spawn(store, options.clone(), deadline));

    let result = fetch(store, compiled, options, deadline);
    drop(watchdog);

    let result = result.map_err(|e| match e {
        MemseeError::Storage(ref err) if MemseeError::is_interrupt(err) => MemseeError::QueryCancelled,
        other => other,
    });

    if store.trace_enabled() {
        let rows = result.as_ref().map(|r| r.len()).ok();
        tracing::info!(
            target: "memsee::trace",
            sql = %compiled.sql,
            params = ?compiled.params,
            rows,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query"
        );
    }
    result
}

fn fetch(
    store: &GraphStore,
    compiled: &CompiledQuery,
    options: &QueryOptions,
    deadline: Option<Instant>,
) -> Result<ResultSet> {
    let conn = store.connection();
    let mut stmt = conn.prepare(&compiled.sql).map_err(|e| {
        if MemseeError::is_interrupt(&e) {
            MemseeError::QueryCancelled
        } else {
            QueryError::Rejected(e.to_string()).into()
        }
    })?;

    let columns: Arc<[String]> = compiled.columns.clone().into();
    let width = columns.len();
    let mut rows = stmt.query(rusqlite::params_from_iter(compiled.params.iter()))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(row.get::<_, Value>(i)?);
        }
        out.push(Row::new(Arc::clone(&columns), values));

        if out.len() % QUERY_ROW_BATCH == 0 {
            options.checkpoint(deadline)?;
        }
    }

    Ok(ResultSet {
        columns: compiled.columns.clone(),
        rows: out,
    })
}

/// Interrupts the running statement when the cancel token fires or the
/// deadline passes, so a single slow step cannot outlive its budget.
struct Watchdog {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Watchdog {
    fn spawn(store: &GraphStore, options: QueryOptions, deadline: Option<Instant>) -> Self {
        let interrupt = store.interrupt_handle();
        let (stop, stopped) = mpsc::channel::<()>();

        let handle = thread::spawn(move || loop {
            match stopped.recv_timeout(WATCHDOG_TICK) {
                Err(RecvTimeoutError::Timeout) => {
                    if options.checkpoint(deadline).is_err() {
                        interrupt.interrupt();
                        return;
                    }
                }
                _ => return,
            }
        });

        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        // Closing the channel wakes the thread.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
