//! memsee CLI - heap snapshot explorer
//!
//! Usage: memsee <command> [arguments]

mod cli;
mod query_cmd;
mod read_cmd;
mod session_cmd;
mod status_cmd;
mod traverse_cmd;

use anyhow::Result;
use memsee::output::{output_json, ErrorResponse};
use memsee::{CancelToken, OutputFormat, Session};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{parse_args, print_usage, Command, Invocation};

/// Cancel `token` on the first SIGINT or SIGTERM.
pub(crate) fn cancel_on_signal(token: &CancelToken) -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::signal;
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([signal::SIGTERM, signal::SIGINT])?;
        let token = token.clone();

        std::thread::spawn(move || {
            for _ in &mut signals {
                token.cancel();
                break;
            }
        });
    }
    #[cfg(not(unix))]
    let _ = token;
    Ok(())
}

fn init_logging(trace: bool) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if trace {
        if let Ok(directive) = "memsee::trace=info".parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn open(db_path: &std::path::Path, trace: bool) -> Result<Session> {
    let session = Session::open(db_path)?;
    session.set_trace(trace);
    Ok(session)
}

fn run(invocation: Invocation) -> Result<()> {
    let Invocation {
        command,
        output_format,
        trace,
    } = invocation;

    match command {
        Command::Help => {
            print_usage();
            Ok(())
        }
        Command::Version => {
            println!("{}", memsee::version::version());
            Ok(())
        }
        Command::Create { db_path, force } => session_cmd::run_create(&db_path, force, output_format),
        Command::Read {
            db_path,
            dump_path,
            batch_size,
            strict,
            mark,
            progress,
        } => {
            let session = open(&db_path, trace)?;
            let args = read_cmd::ReadArgs {
                dump_path,
                batch_size,
                strict,
                mark,
                progress,
            };
            read_cmd::run_read(args, &session, output_format)
        }
        Command::Stats { db_path } => status_cmd::run_stats(&open(&db_path, trace)?, output_format),
        Command::History { db_path, limit } => {
            status_cmd::run_history(&open(&db_path, trace)?, limit, output_format)
        }
        Command::Mark { db_path } => session_cmd::run_mark(&open(&db_path, trace)?, output_format),
        Command::Pin { db_path, predicate } => {
            session_cmd::run_pin(&open(&db_path, trace)?, &predicate, output_format)
        }
        Command::Query {
            db_path,
            query,
            timeout_ms,
        } => query_cmd::run_query(&open(&db_path, trace)?, &query, timeout_ms, output_format),
        Command::Types {
            db_path,
            bytes,
            limit,
        } => query_cmd::run_types(&open(&db_path, trace)?, bytes, limit, output_format),
        Command::Info { db_path, address } => {
            traverse_cmd::run_info(&open(&db_path, trace)?, &address, output_format)
        }
        Command::Parents { db_path, address } => {
            traverse_cmd::run_parents(&open(&db_path, trace)?, &address, output_format)
        }
        Command::Kids { db_path, address } => {
            traverse_cmd::run_kids(&open(&db_path, trace)?, &address, output_format)
        }
        Command::Path {
            db_path,
            from,
            to,
            reversed,
        } => traverse_cmd::run_path(&open(&db_path, trace)?, &from, &to, reversed, output_format),
        Command::Ancestors { db_path, predicate } => {
            traverse_cmd::run_ancestors(&open(&db_path, trace)?, &predicate, output_format)
        }
        Command::Set {
            db_path,
            name,
            value,
        } => session_cmd::run_set(&open(&db_path, trace)?, &name, &value, output_format),
        Command::Names { db_path } => session_cmd::run_names(&open(&db_path, trace)?, output_format),
        Command::Backup { db_path } => session_cmd::run_backup(&open(&db_path, trace)?, output_format),
        Command::Restore { db_path } => {
            session_cmd::run_restore(&open(&db_path, trace)?, output_format)
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let invocation = match parse_args(&args) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            return ExitCode::from(1);
        }
    };

    init_logging(invocation.trace);
    let output_format = invocation.output_format;

    match run(invocation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match output_format {
                OutputFormat::Json => {
                    if output_json(&ErrorResponse::from_error(&e)).is_err() {
                        eprintln!("Error: {:#}", e);
                    }
                }
                OutputFormat::Human => eprintln!("Error: {:#}", e),
            }
            ExitCode::from(1)
        }
    }
}
