//! CLI argument parsing for memsee
//!
//! Defines the Command enum and parse_args() for all CLI commands. Global
//! flags (`--output`, `--trace`) may appear anywhere on the command line.

use anyhow::{Context, Result};
use memsee::{OutputFormat, DEFAULT_BATCH_SIZE};
use std::path::PathBuf;

/// Environment override for the default batch size.
pub const BATCH_SIZE_ENV: &str = "MEMSEE_BATCH_SIZE";

pub fn print_usage() {
    eprintln!("memsee - heap snapshot explorer");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  memsee <command> [arguments] [--output human|json] [--trace]");
    eprintln!("  memsee --help | --version");
    eprintln!();
    eprintln!("  memsee create <DB> [--force]");
    eprintln!("  memsee read <DB> <DUMP> [--batch-size <N>] [--strict] [--no-mark] [--no-progress]");
    eprintln!("  memsee stats <DB>");
    eprintln!("  memsee history <DB> [--limit <N>]");
    eprintln!("  memsee mark <DB>");
    eprintln!("  memsee pin <DB> <PREDICATE>");
    eprintln!("  memsee query <DB> <QUERY> [--timeout-ms <N>]");
    eprintln!("  memsee types <DB> [--bytes] [--limit <N>]");
    eprintln!("  memsee info <DB> <ADDRESS>");
    eprintln!("  memsee parents <DB> <ADDRESS>");
    eprintln!("  memsee kids <DB> <ADDRESS>");
    eprintln!("  memsee path <DB> --from <SELECTOR> --to <SELECTOR> [--reversed]");
    eprintln!("  memsee ancestors <DB> <PREDICATE>");
    eprintln!("  memsee set <DB> <NAME> <VALUE>");
    eprintln!("  memsee names <DB>");
    eprintln!("  memsee backup <DB>");
    eprintln!("  memsee restore <DB>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  create      Create an empty session store");
    eprintln!("  read        Ingest a dump file (one JSON object per line)");
    eprintln!("  stats       Object and reference counts, total bytes");
    eprintln!("  history     Past ingestion runs");
    eprintln!("  mark        Recompute root/top marks");
    eprintln!("  pin         Designate objects matching a predicate as top");
    eprintln!("  query       Run a JSON query expression");
    eprintln!("  types       Object counts (or bytes) per type");
    eprintln!("  info        Show one object");
    eprintln!("  parents     Objects referencing an address");
    eprintln!("  kids        Descendants held only through an object");
    eprintln!("  path        Shortest reference paths between objects");
    eprintln!("  ancestors   Ancestor types per generation");
    eprintln!("  set         Define a named value, usable as $NAME");
    eprintln!("  names       List named values");
    eprintln!("  backup      Copy the store to <DB>.bak (one level)");
    eprintln!("  restore     Replace the store with <DB>.bak");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <ADDRESS>     Decimal, 0x-prefixed hex, or $NAME");
    eprintln!("  <PREDICATE>   JSON expression over objects, or @FILE");
    eprintln!("  <QUERY>       JSON query tree, or @FILE");
    eprintln!("  <SELECTOR>    An <ADDRESS> or a <PREDICATE>");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  {}   Default batch size (default: {})", BATCH_SIZE_ENV, DEFAULT_BATCH_SIZE);
    eprintln!("  RUST_LOG            Log filter (default: warn)");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create {
        db_path: PathBuf,
        force: bool,
    },
    Read {
        db_path: PathBuf,
        dump_path: PathBuf,
        batch_size: usize,
        strict: bool,
        mark: bool,
        progress: bool,
    },
    Stats {
        db_path: PathBuf,
    },
    History {
        db_path: PathBuf,
        limit: Option<usize>,
    },
    Mark {
        db_path: PathBuf,
    },
    Pin {
        db_path: PathBuf,
        predicate: String,
    },
    Query {
        db_path: PathBuf,
        query: String,
        timeout_ms: Option<u64>,
    },
    Types {
        db_path: PathBuf,
        bytes: bool,
        limit: Option<u64>,
    },
    Info {
        db_path: PathBuf,
        address: String,
    },
    Parents {
        db_path: PathBuf,
        address: String,
    },
    Kids {
        db_path: PathBuf,
        address: String,
    },
    Path {
        db_path: PathBuf,
        from: String,
        to: String,
        reversed: bool,
    },
    Ancestors {
        db_path: PathBuf,
        predicate: String,
    },
    Set {
        db_path: PathBuf,
        name: String,
        value: String,
    },
    Names {
        db_path: PathBuf,
    },
    Backup {
        db_path: PathBuf,
    },
    Restore {
        db_path: PathBuf,
    },
    Version,
    Help,
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    pub output_format: OutputFormat,
    pub trace: bool,
}

/// Parse `args` (without the program name).
pub fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut output_format = OutputFormat::Human;
    let mut trace = false;
    let mut rest: Vec<String> = Vec::with_capacity(args.len());

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--output" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("--output requires an argument"))?;
                output_format = OutputFormat::from_str(value)
                    .ok_or_else(|| anyhow::anyhow!("Invalid output format: {}", value))?;
                i += 2;
            }
            "--trace" => {
                trace = true;
                i += 1;
            }
            _ => {
                rest.push(args[i].clone());
                i += 1;
            }
        }
    }

    let command = parse_command(&rest)?;
    Ok(Invocation {
        command,
        output_format,
        trace,
    })
}

/// Positional arguments and flags left after the subcommand name.
struct ArgCursor<'a> {
    args: &'a [String],
    i: usize,
    positional: Vec<&'a str>,
}

impl<'a> ArgCursor<'a> {
    fn new(args: &'a [String]) -> Self {
        Self {
            args,
            i: 0,
            positional: Vec::new(),
        }
    }

    fn value(&mut self, flag: &str) -> Result<&'a str> {
        let value = self
            .args
            .get(self.i + 1)
            .ok_or_else(|| anyhow::anyhow!("{} requires an argument", flag))?;
        self.i += 2;
        Ok(value.as_str())
    }

    /// Walk the arguments, handing every `--flag` to `on_flag`.
    fn walk<F>(mut self, mut on_flag: F) -> Result<Vec<&'a str>>
    where
        F: FnMut(&str, &mut Self) -> Result<()>,
    {
        let args = self.args;
        while self.i < args.len() {
            let arg = args[self.i].as_str();
            if arg.starts_with("--") {
                on_flag(arg, &mut self)?;
            } else {
                self.positional.push(arg);
                self.i += 1;
            }
        }
        Ok(self.positional)
    }

    fn flag(&mut self) {
        self.i += 1;
    }
}

fn unknown(flag: &str) -> anyhow::Error {
    anyhow::anyhow!("Unknown argument: {}", flag)
}

fn expect_positional<'a>(positional: &[&'a str], names: &[&str]) -> Result<Vec<&'a str>> {
    if positional.len() < names.len() {
        return Err(anyhow::anyhow!(
            "missing <{}>",
            names[positional.len()].to_uppercase()
        ));
    }
    if positional.len() > names.len() {
        return Err(anyhow::anyhow!("Unexpected argument: {}", positional[names.len()]));
    }
    Ok(positional.to_vec())
}

fn no_flags(args: &[String], names: &[&str]) -> Result<Vec<String>> {
    let positional = ArgCursor::new(args).walk(|flag, _| Err(unknown(flag)))?;
    Ok(expect_positional(&positional, names)?
        .into_iter()
        .map(str::to_string)
        .collect())
}

/// Default batch size, honouring the environment override.
pub fn default_batch_size() -> Result<usize> {
    match std::env::var(BATCH_SIZE_ENV) {
        Ok(value) => parse_batch_size(&value).with_context(|| format!("invalid {}", BATCH_SIZE_ENV)),
        Err(_) => Ok(DEFAULT_BATCH_SIZE),
    }
}

fn parse_batch_size(value: &str) -> Result<usize> {
    let n: usize = value.trim().parse()?;
    if n == 0 {
        return Err(anyhow::anyhow!("batch size must be at least 1"));
    }
    Ok(n)
}

fn parse_command(args: &[String]) -> Result<Command> {
    let Some(name) = args.first() else {
        return Err(anyhow::anyhow!("Missing command"));
    };
    let args = &args[1..];

    match name.as_str() {
        "--help" | "-h" | "help" => Ok(Command::Help),
        "--version" | "-V" | "version" => Ok(Command::Version),
        "create" => {
            let mut force = false;
            let positional = ArgCursor::new(args).walk(|flag, cursor| match flag {
                "--force" => {
                    force = true;
                    cursor.flag();
                    Ok(())
                }
                _ => Err(unknown(flag)),
            })?;
            let p = expect_positional(&positional, &["db"])?;
            Ok(Command::Create {
                db_path: PathBuf::from(p[0]),
                force,
            })
        }
        "read" => {
            let mut batch_size = None;
            let mut strict = false;
            let mut mark = true;
            let mut progress = true;
            let positional = ArgCursor::new(args).walk(|flag, cursor| {
                match flag {
                    "--batch-size" => batch_size = Some(parse_batch_size(cursor.value(flag)?)?),
                    "--strict" => {
                        strict = true;
                        cursor.flag();
                    }
                    "--no-mark" => {
                        mark = false;
                        cursor.flag();
                    }
                    "--no-progress" => {
                        progress = false;
                        cursor.flag();
                    }
                    _ => return Err(unknown(flag)),
                }
                Ok(())
            })?;
            let p = expect_positional(&positional, &["db", "dump"])?;
            let batch_size = match batch_size {
                Some(n) => n,
                None => default_batch_size()?,
            };
            Ok(Command::Read {
                db_path: PathBuf::from(p[0]),
                dump_path: PathBuf::from(p[1]),
                batch_size,
                strict,
                mark,
                progress,
            })
        }
        "stats" => {
            let p = no_flags(args, &["db"])?;
            Ok(Command::Stats {
                db_path: PathBuf::from(&p[0]),
            })
        }
        "history" => {
            let mut limit: Option<usize> = None;
            let positional = ArgCursor::new(args).walk(|flag, cursor| match flag {
                "--limit" => {
                    limit = Some(cursor.value(flag)?.parse()?);
                    Ok(())
                }
                _ => Err(unknown(flag)),
            })?;
            let p = expect_positional(&positional, &["db"])?;
            Ok(Command::History {
                db_path: PathBuf::from(p[0]),
                limit,
            })
        }
        "mark" => {
            let p = no_flags(args, &["db"])?;
            Ok(Command::Mark {
                db_path: PathBuf::from(&p[0]),
            })
        }
        "pin" => {
            let p = no_flags(args, &["db", "predicate"])?;
            Ok(Command::Pin {
                db_path: PathBuf::from(&p[0]),
                predicate: p[1].clone(),
            })
        }
        "query" => {
            let mut timeout_ms: Option<u64> = None;
            let positional = ArgCursor::new(args).walk(|flag, cursor| match flag {
                "--timeout-ms" => {
                    timeout_ms = Some(cursor.value(flag)?.parse()?);
                    Ok(())
                }
                _ => Err(unknown(flag)),
            })?;
            let p = expect_positional(&positional, &["db", "query"])?;
            Ok(Command::Query {
                db_path: PathBuf::from(p[0]),
                query: p[1].to_string(),
                timeout_ms,
            })
        }
        "types" => {
            let mut bytes = false;
            let mut limit: Option<u64> = None;
            let positional = ArgCursor::new(args).walk(|flag, cursor| {
                match flag {
                    "--bytes" => {
                        bytes = true;
                        cursor.flag();
                    }
                    "--limit" => limit = Some(cursor.value(flag)?.parse()?),
                    _ => return Err(unknown(flag)),
                }
                Ok(())
            })?;
            let p = expect_positional(&positional, &["db"])?;
            Ok(Command::Types {
                db_path: PathBuf::from(p[0]),
                bytes,
                limit,
            })
        }
        "info" | "parents" | "kids" => {
            let p = no_flags(args, &["db", "address"])?;
            let db_path = PathBuf::from(&p[0]);
            let address = p[1].clone();
            Ok(match name.as_str() {
                "info" => Command::Info { db_path, address },
                "parents" => Command::Parents { db_path, address },
                _ => Command::Kids { db_path, address },
            })
        }
        "path" => {
            let mut from = None;
            let mut to = None;
            let mut reversed = false;
            let positional = ArgCursor::new(args).walk(|flag, cursor| {
                match flag {
                    "--from" => from = Some(cursor.value(flag)?.to_string()),
                    "--to" => to = Some(cursor.value(flag)?.to_string()),
                    "--reversed" => {
                        reversed = true;
                        cursor.flag();
                    }
                    _ => return Err(unknown(flag)),
                }
                Ok(())
            })?;
            let p = expect_positional(&positional, &["db"])?;
            Ok(Command::Path {
                db_path: PathBuf::from(p[0]),
                from: from.ok_or_else(|| anyhow::anyhow!("--from is required"))?,
                to: to.ok_or_else(|| anyhow::anyhow!("--to is required"))?,
                reversed,
            })
        }
        "ancestors" => {
            let p = no_flags(args, &["db", "predicate"])?;
            Ok(Command::Ancestors {
                db_path: PathBuf::from(&p[0]),
                predicate: p[1].clone(),
            })
        }
        "set" => {
            let p = no_flags(args, &["db", "name", "value"])?;
            Ok(Command::Set {
                db_path: PathBuf::from(&p[0]),
                name: p[1].clone(),
                value: p[2].clone(),
            })
        }
        "names" => {
            let p = no_flags(args, &["db"])?;
            Ok(Command::Names {
                db_path: PathBuf::from(&p[0]),
            })
        }
        "backup" => {
            let p = no_flags(args, &["db"])?;
            Ok(Command::Backup {
                db_path: PathBuf::from(&p[0]),
            })
        }
        "restore" => {
            let p = no_flags(args, &["db"])?;
            Ok(Command::Restore {
                db_path: PathBuf::from(&p[0]),
            })
        }
        other => Err(anyhow::anyhow!("Unknown command: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_global_flags_anywhere() {
        let inv = parse_args(&args("stats heap.db --output json --trace")).unwrap();
        assert_eq!(inv.output_format, OutputFormat::Json);
        assert!(inv.trace);
        assert_eq!(
            inv.command,
            Command::Stats {
                db_path: PathBuf::from("heap.db")
            }
        );
    }

    #[test]
    fn test_read_flags() {
        let inv = parse_args(&args("read heap.db dump.json --batch-size 100 --strict --no-mark")).unwrap();
        match inv.command {
            Command::Read {
                batch_size,
                strict,
                mark,
                progress,
                ..
            } => {
                assert_eq!(batch_size, 100);
                assert!(strict);
                assert!(!mark);
                assert!(progress);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(parse_args(&args("read heap.db dump.json --batch-size 0")).is_err());
    }

    #[test]
    fn test_missing_positional_named() {
        let err = parse_args(&args("set heap.db root")).unwrap_err();
        assert!(err.to_string().contains("<VALUE>"));
    }

    #[test]
    fn test_path_requires_from_and_to() {
        assert!(parse_args(&args("path heap.db --from 1")).is_err());
        let inv = parse_args(&args("path heap.db --from 1 --to $x --reversed")).unwrap();
        assert_eq!(
            inv.command,
            Command::Path {
                db_path: PathBuf::from("heap.db"),
                from: "1".to_string(),
                to: "$x".to_string(),
                reversed: true,
            }
        );
    }

    #[test]
    fn test_backup_and_restore_take_only_the_store() {
        let inv = parse_args(&args("backup heap.db")).unwrap();
        assert_eq!(
            inv.command,
            Command::Backup {
                db_path: PathBuf::from("heap.db")
            }
        );
        assert!(parse_args(&args("restore")).is_err());
        assert!(parse_args(&args("restore heap.db heap.db.bak")).is_err());
    }

    #[test]
    fn test_unknown_command_and_flag() {
        assert!(parse_args(&args("frobnicate heap.db")).is_err());
        assert!(parse_args(&args("stats heap.db --verbose")).is_err());
        assert!(parse_args(&args("--output yaml stats heap.db")).is_err());
    }
}
