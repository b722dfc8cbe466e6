//! Read command implementation
//!
//! Ingests a dump file into an existing session. SIGINT/SIGTERM cancel the
//! run at the next record; batches already committed stay in the store.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use memsee::output::{generate_execution_id, output_json, JsonResponse};
use memsee::{CancelToken, IngestOptions, IngestProgress, IngestionReport, OutputFormat, Session};

/// Records between progress callbacks.
const PROGRESS_EVERY: u64 = 10_000;

pub struct ReadArgs {
    pub dump_path: PathBuf,
    pub batch_size: usize,
    pub strict: bool,
    pub mark: bool,
    pub progress: bool,
}

/// Run read command
///
/// Usage: memsee read <DB> <DUMP> [--batch-size <N>] [--strict] [--no-mark]
pub fn run_read(args: ReadArgs, session: &Session, output_format: OutputFormat) -> Result<()> {
    let cancel = CancelToken::new();

    crate::cancel_on_signal(&cancel)?;

    let mut options = IngestOptions::default()
        .with_batch_size(args.batch_size)
        .strict(args.strict)
        .with_progress_every(PROGRESS_EVERY)
        .with_cancel(cancel);
    if !args.mark {
        options = options.without_marking();
    }

    let bar = if args.progress && output_format == OutputFormat::Human {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {pos} records [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Some(bar)
    } else {
        None
    };

    let on_progress = bar.clone().map(|bar| {
        move |p: &IngestProgress| {
            bar.set_position(p.records_read);
            bar.set_message(format!(
                "{} objects, {} refs, {} batches",
                p.objects_loaded, p.references_loaded, p.batches_committed
            ));
        }
    });
    let progress_fn = on_progress
        .as_ref()
        .map(|f| f as &memsee::ingest::IngestProgressFn<'_>);

    let result = memsee::ingest_file(session, &args.dump_path, &options, progress_fn);
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }
    let report = result?;

    match output_format {
        OutputFormat::Json => {
            let exec_id = generate_execution_id();
            let partial = !report.is_complete();
            let response = JsonResponse::new(&report, &exec_id).with_partial(partial);
            output_json(&response)?;
        }
        OutputFormat::Human => print_report(&report),
    }

    Ok(())
}

fn print_report(report: &IngestionReport) {
    for diagnostic in report.diagnostics() {
        eprintln!("{}", diagnostic);
    }
    if report.parse_error_count as usize > report.parse_errors.len() {
        eprintln!(
            "... {} more malformed records not shown",
            report.parse_error_count as usize - report.parse_errors.len()
        );
    }
    if report.warning_count as usize > report.warnings.len() {
        eprintln!(
            "... {} more warnings not shown",
            report.warning_count as usize - report.warnings.len()
        );
    }

    println!(
        "loaded {} objects, {} refs ({} bytes) in {:.2}s",
        report.objects_loaded,
        report.references_loaded,
        report.total_bytes,
        report.elapsed.as_secs_f64()
    );
    if let Some(marked) = report.roots_marked {
        println!("marked {} objects", marked);
    }
    if report.cancelled {
        println!("cancelled after {} batches", report.batches_committed);
    }
    if !report.failed_batches.is_empty() {
        println!("{} batches lost", report.failed_batches.len());
    }
}
