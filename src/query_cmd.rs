//! Query and types command implementations

use anyhow::Result;
use std::time::Duration;

use memsee::common::parse_query;
use memsee::output::{
    generate_execution_id, output_json, render_table, CellFormatter, JsonResponse, QueryResponse,
};
use memsee::query::patterns;
use memsee::{CancelToken, OutputFormat, QueryOptions, ResultSet, Session};

/// Run query command
///
/// Usage: memsee query <DB> <QUERY> [--timeout-ms <N>]
pub fn run_query(
    session: &Session,
    query: &str,
    timeout_ms: Option<u64>,
    output_format: OutputFormat,
) -> Result<()> {
    let query = parse_query(query)?;

    let cancel = CancelToken::new();
    crate::cancel_on_signal(&cancel)?;
    let mut options = QueryOptions::default().with_cancel(cancel);
    if let Some(ms) = timeout_ms {
        options = options.with_timeout(Duration::from_millis(ms));
    }

    let result = session.query_with(&query, &options)?;
    print_result(session, result, output_format)
}

/// Run types command
///
/// Usage: memsee types <DB> [--bytes] [--limit <N>]
pub fn run_types(
    session: &Session,
    bytes: bool,
    limit: Option<u64>,
    output_format: OutputFormat,
) -> Result<()> {
    let mut query = if bytes {
        patterns::bytes_by_type()
    } else {
        patterns::count_by_type()
    };
    if let Some(n) = limit {
        query = query.limit(n);
    }

    let result = session.query(&query)?;
    print_result(session, result, output_format)
}

fn print_result(
    session: &Session,
    result: ResultSet,
    output_format: OutputFormat,
) -> Result<()> {
    match output_format {
        OutputFormat::Json => {
            let exec_id = generate_execution_id();
            output_json(&JsonResponse::new(QueryResponse::from(result), &exec_id))?;
        }
        OutputFormat::Human => {
            let cells = CellFormatter::with_names(&session.names()?);
            let rows: Vec<Vec<String>> = result
                .rows
                .iter()
                .map(|row| row.values().iter().map(|v| cells.cell(v)).collect())
                .collect();
            print!("{}", render_table(&result.columns, &rows));
            println!("({} rows)", result.rows.len());
        }
    }
    Ok(())
}
