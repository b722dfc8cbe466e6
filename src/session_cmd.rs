//! Session management commands: create, set, names, mark, pin, backup, restore

use anyhow::Result;
use std::path::Path;

use memsee::common::parse_predicate;
use memsee::output::{
    generate_execution_id, output_json, render_table, BackupResponse, JsonResponse, MarkResponse,
    NamedValue,
    NamesResponse, StatsResponse,
};
use memsee::{CreateMode, MarkReport, OutputFormat, Session};

/// Run create command
///
/// Usage: memsee create <DB> [--force]
pub fn run_create(db_path: &Path, force: bool, output_format: OutputFormat) -> Result<()> {
    let mode = if force {
        CreateMode::Truncate
    } else {
        CreateMode::FailIfExists
    };
    let session = Session::create_with(db_path, mode)?;

    match output_format {
        OutputFormat::Json => {
            let response = StatsResponse {
                path: session.path().display().to_string(),
                stats: session.stats()?,
            };
            let exec_id = generate_execution_id();
            output_json(&JsonResponse::new(response, &exec_id))?;
        }
        OutputFormat::Human => println!("created {}", db_path.display()),
    }
    Ok(())
}

/// Run set command
///
/// Usage: memsee set <DB> <NAME> <VALUE>
pub fn run_set(session: &Session, name: &str, value: &str, output_format: OutputFormat) -> Result<()> {
    let name = name.strip_prefix('$').unwrap_or(name);
    session.define_name(name, value)?;

    match output_format {
        OutputFormat::Json => {
            let response = NamesResponse {
                names: vec![NamedValue {
                    name: name.to_string(),
                    value: value.to_string(),
                }],
            };
            let exec_id = generate_execution_id();
            output_json(&JsonResponse::new(response, &exec_id))?;
        }
        OutputFormat::Human => println!("${} = {}", name, value),
    }
    Ok(())
}

/// Run names command
///
/// Usage: memsee names <DB>
pub fn run_names(session: &Session, output_format: OutputFormat) -> Result<()> {
    let names = session.names()?;

    match output_format {
        OutputFormat::Json => {
            let names = names
                .into_iter()
                .map(|(name, value)| NamedValue { name, value })
                .collect();
            let exec_id = generate_execution_id();
            output_json(&JsonResponse::new(NamesResponse { names }, &exec_id))?;
        }
        OutputFormat::Human => {
            let columns = vec!["name".to_string(), "value".to_string()];
            let rows: Vec<Vec<String>> = names
                .into_iter()
                .map(|(name, value)| vec![format!("${}", name), value])
                .collect();
            print!("{}", render_table(&columns, &rows));
        }
    }
    Ok(())
}

/// Run backup command
///
/// Usage: memsee backup <DB>
pub fn run_backup(session: &Session, output_format: OutputFormat) -> Result<()> {
    let backup = session.backup()?;
    print_backup(session, &backup, "backed up to", output_format)
}

/// Run restore command
///
/// Usage: memsee restore <DB>
pub fn run_restore(session: &Session, output_format: OutputFormat) -> Result<()> {
    let backup = session.restore()?;
    print_backup(session, &backup, "restored from", output_format)
}

fn print_backup(
    session: &Session,
    backup: &Path,
    verb: &str,
    output_format: OutputFormat,
) -> Result<()> {
    match output_format {
        OutputFormat::Json => {
            let response = BackupResponse {
                path: session.path().display().to_string(),
                backup: backup.display().to_string(),
            };
            let exec_id = generate_execution_id();
            output_json(&JsonResponse::new(response, &exec_id))?;
        }
        OutputFormat::Human => println!("{} {}", verb, backup.display()),
    }
    Ok(())
}

/// Run mark command
///
/// Usage: memsee mark <DB>
pub fn run_mark(session: &Session, output_format: OutputFormat) -> Result<()> {
    let report = session.mark_top()?;
    print_mark(None, report, output_format)
}

/// Run pin command
///
/// Usage: memsee pin <DB> <PREDICATE>
pub fn run_pin(session: &Session, predicate: &str, output_format: OutputFormat) -> Result<()> {
    let predicate = parse_predicate(predicate)?;
    let pinned = session.pin(&predicate)?;
    let report = session.mark_top()?;
    print_mark(Some(pinned), report, output_format)
}

fn print_mark(pinned: Option<u64>, report: MarkReport, output_format: OutputFormat) -> Result<()> {
    match output_format {
        OutputFormat::Json => {
            let exec_id = generate_execution_id();
            output_json(&JsonResponse::new(MarkResponse { pinned, report }, &exec_id))?;
        }
        OutputFormat::Human => {
            if let Some(n) = pinned {
                println!("pinned {} objects", n);
            }
            println!(
                "marked {} objects ({} roots, {} designated)",
                report.marked, report.roots, report.designated
            );
        }
    }
    Ok(())
}
