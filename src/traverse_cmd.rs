//! Graph navigation commands: info, parents, kids, path, ancestors

use anyhow::Result;

use memsee::common::{parse_predicate, resolve_address, resolve_selector};
use memsee::output::{
    generate_execution_id, object_cells, object_columns, output_json, render_table,
    AncestorsResponse, CellFormatter, JsonResponse, ObjectsResponse, PathMatch, PathResponse,
    SubtreeResponse,
};
use memsee::{CancelToken, Direction, ObjectRow, OutputFormat, QueryOptions, Session};

fn interruptible() -> Result<QueryOptions> {
    let cancel = CancelToken::new();
    crate::cancel_on_signal(&cancel)?;
    Ok(QueryOptions::default().with_cancel(cancel))
}

fn print_objects(session: &Session, objects: &[ObjectRow]) -> Result<()> {
    let cells = CellFormatter::with_names(&session.names()?);
    let rows: Vec<Vec<String>> = objects.iter().map(|o| object_cells(o, &cells)).collect();
    print!("{}", render_table(&object_columns(), &rows));
    Ok(())
}

/// Run info command
///
/// Usage: memsee info <DB> <ADDRESS>
pub fn run_info(session: &Session, address: &str, output_format: OutputFormat) -> Result<()> {
    let address = resolve_address(session, address)?;
    let objects: Vec<ObjectRow> = session.object(address)?.into_iter().collect();

    match output_format {
        OutputFormat::Json => {
            let exec_id = generate_execution_id();
            output_json(&JsonResponse::new(ObjectsResponse { address, objects }, &exec_id))?;
        }
        OutputFormat::Human => {
            if objects.is_empty() {
                println!("no object at {}", address);
                return Ok(());
            }
            print_objects(session, &objects)?;
            let parents = session.parents(address)?.len();
            let children = session.children(address)?.len();
            println!("{} parents, {} children", parents, children);
        }
    }
    Ok(())
}

/// Run parents command
///
/// Usage: memsee parents <DB> <ADDRESS>
pub fn run_parents(session: &Session, address: &str, output_format: OutputFormat) -> Result<()> {
    let address = resolve_address(session, address)?;
    let objects = session.parents(address)?;

    match output_format {
        OutputFormat::Json => {
            let exec_id = generate_execution_id();
            output_json(&JsonResponse::new(ObjectsResponse { address, objects }, &exec_id))?;
        }
        OutputFormat::Human => {
            print_objects(session, &objects)?;
            println!("({} parents)", objects.len());
        }
    }
    Ok(())
}

/// Run kids command
///
/// Usage: memsee kids <DB> <ADDRESS>
pub fn run_kids(session: &Session, address: &str, output_format: OutputFormat) -> Result<()> {
    let address = resolve_address(session, address)?;
    let entries = session.owned_subtree(address, &interruptible()?)?;

    match output_format {
        OutputFormat::Json => {
            let exec_id = generate_execution_id();
            output_json(&JsonResponse::new(SubtreeResponse { address, entries }, &exec_id))?;
        }
        OutputFormat::Human => {
            if entries.is_empty() {
                println!("no object at {}", address);
                return Ok(());
            }
            let cells = CellFormatter::with_names(&session.names()?);
            let mut owned_bytes = 0u64;
            for entry in &entries {
                let object = &entry.object;
                let shared = if entry.owned {
                    owned_bytes += object.size;
                    String::new()
                } else {
                    format!(" (shared, {} refs)", entry.in_degree)
                };
                println!(
                    "{}{} {} {}{}",
                    "  ".repeat(entry.depth),
                    cells.address(object.address),
                    object.type_name,
                    object.size,
                    shared
                );
            }
            println!("owned bytes: {}", owned_bytes);
        }
    }
    Ok(())
}

/// Run path command
///
/// Usage: memsee path <DB> --from <SELECTOR> --to <SELECTOR> [--reversed]
pub fn run_path(
    session: &Session,
    from: &str,
    to: &str,
    reversed: bool,
    output_format: OutputFormat,
) -> Result<()> {
    let from = match resolve_selector(session, from)?.as_slice() {
        [single] => *single,
        [] => return Err(anyhow::anyhow!("--from matches no object")),
        many => {
            return Err(anyhow::anyhow!(
                "--from matches {} objects; narrow it to one",
                many.len()
            ))
        }
    };
    let targets = resolve_selector(session, to)?;
    let direction = if reversed {
        Direction::Reverse
    } else {
        Direction::Forward
    };

    let found = session.shortest_paths(from, &targets, direction, &interruptible()?)?;
    let mut paths = Vec::with_capacity(found.len());
    for (target, addresses) in targets.iter().zip(found) {
        let mut objects = Vec::with_capacity(addresses.len());
        for address in &addresses {
            if let Some(object) = session.object(*address)? {
                objects.push(object);
            }
        }
        paths.push(PathMatch {
            target: *target,
            addresses,
            objects,
        });
    }

    match output_format {
        OutputFormat::Json => {
            let response = PathResponse {
                from,
                reversed,
                paths,
            };
            let exec_id = generate_execution_id();
            output_json(&JsonResponse::new(response, &exec_id))?;
        }
        OutputFormat::Human => {
            let cells = CellFormatter::with_names(&session.names()?);
            for path in &paths {
                if path.addresses.is_empty() {
                    println!("no path to {}", cells.address(path.target));
                    continue;
                }
                let hops: Vec<String> = path
                    .addresses
                    .iter()
                    .map(|address| {
                        let type_name = path
                            .objects
                            .iter()
                            .find(|o| o.address == *address)
                            .map_or("?", |o| o.type_name.as_str());
                        format!("{} {}", cells.address(*address), type_name)
                    })
                    .collect();
                let arrow = if reversed { " <- " } else { " -> " };
                println!("{}", hops.join(arrow));
            }
        }
    }
    Ok(())
}

/// Run ancestors command
///
/// Usage: memsee ancestors <DB> <PREDICATE>
pub fn run_ancestors(session: &Session, predicate: &str, output_format: OutputFormat) -> Result<()> {
    let predicate = parse_predicate(predicate)?;
    let generations = session.ancestor_types(&predicate, &interruptible()?)?;

    match output_format {
        OutputFormat::Json => {
            let exec_id = generate_execution_id();
            output_json(&JsonResponse::new(AncestorsResponse { generations }, &exec_id))?;
        }
        OutputFormat::Human => {
            let columns: Vec<String> = ["gen", "type", "count"].iter().map(|s| s.to_string()).collect();
            let rows: Vec<Vec<String>> = generations
                .iter()
                .map(|g| vec![g.generation.to_string(), g.type_name.clone(), g.count.to_string()])
                .collect();
            print!("{}", render_table(&columns, &rows));
        }
    }
    Ok(())
}
