//! Stats and history command implementations

use anyhow::Result;
use chrono::{TimeZone, Utc};

use memsee::output::{
    generate_execution_id, output_json, render_table, Count, HistoryResponse, JsonResponse,
    StatsResponse,
};
use memsee::{OutputFormat, Session};

/// Run stats command
///
/// Usage: memsee stats <DB>
pub fn run_stats(session: &Session, output_format: OutputFormat) -> Result<()> {
    let stats = session.stats()?;

    match output_format {
        OutputFormat::Json => {
            let response = StatsResponse {
                path: session.path().display().to_string(),
                stats,
            };
            let exec_id = generate_execution_id();
            output_json(&JsonResponse::new(response, &exec_id))?;
        }
        OutputFormat::Human => {
            println!("objects: {}", Count(stats.objects).both());
            println!("references: {}", Count(stats.references).both());
            println!("bytes: {}", Count(stats.total_bytes).both());
            println!("marked: {}", Count(stats.roots).both());
        }
    }

    Ok(())
}

/// Run history command
///
/// Usage: memsee history <DB> [--limit <N>]
pub fn run_history(session: &Session, limit: Option<usize>, output_format: OutputFormat) -> Result<()> {
    let runs = session.ingest_history(limit)?;

    match output_format {
        OutputFormat::Json => {
            let exec_id = generate_execution_id();
            output_json(&JsonResponse::new(HistoryResponse { runs }, &exec_id))?;
        }
        OutputFormat::Human => {
            if runs.is_empty() {
                println!("no ingestion runs");
                return Ok(());
            }
            let columns: Vec<String> = ["started", "outcome", "objects", "refs", "lost", "ms", "source"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            let rows: Vec<Vec<String>> = runs
                .iter()
                .map(|run| {
                    vec![
                        format_timestamp(run.started_at),
                        run.outcome.clone(),
                        run.objects.to_string(),
                        run.refs.to_string(),
                        run.failed_batches.len().to_string(),
                        run.duration_ms.map_or_else(|| "-".to_string(), |ms| ms.to_string()),
                        run.source.clone(),
                    ]
                })
                .collect();
            print!("{}", render_table(&columns, &rows));
        }
    }

    Ok(())
}

fn format_timestamp(secs: i64) -> String {
    match Utc.timestamp_opt(secs, 0).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => secs.to_string(),
    }
}
