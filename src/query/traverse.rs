//! Graph traversals over the reference table.
//!
//! Every traversal walks level by level with indexed point lookups on
//! `ref.parent` / `ref.child`, so memory is bounded by the visited set rather
//! than the size of the store. The cancel token and deadline are checked once
//! per level.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Instant;

use rusqlite::params;

use crate::error::Result;
use crate::store::{object_from_row, sql_int, GraphStore, ObjectRow};
use crate::Address;

use super::compile::compile_predicate;
use super::exec::QueryOptions;
use super::expr::{Collection, Expr};

/// Ancestor climbing stops at objects of these types.
pub const ANCESTOR_STOP_TYPES: &[&str] = &["module", "Settings"];

/// Which way references are followed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Parent to child
    #[default]
    Forward,
    /// Child to parent
    Reverse,
}

/// Number of distinct ancestors of one type at one generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorTypeCount {
    pub generation: usize,
    #[serde(rename = "type")]
    pub type_name: String,
    pub count: u64,
}

/// One object shown while walking an owned subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreeEntry {
    pub depth: usize,
    pub object: ObjectRow,
    /// References to this object across the whole store
    pub in_degree: u64,
    /// Reached only through the walk (in-degree 1); only these are descended into
    pub owned: bool,
}

const OBJECT_SELECT: &str = "SELECT obj.seq, obj.address, obj.type, obj.name, obj.value, obj.size,
        obj.len, obj.repr, obj.top, obj.mark FROM obj";

pub fn object(store: &GraphStore, address: Address) -> Result<Option<ObjectRow>> {
    store.get_object(address)
}

/// Objects referencing `address`, once per reference, in reference order.
pub fn parents(store: &GraphStore, address: Address) -> Result<Vec<ObjectRow>> {
    let sql = format!(
        "{} JOIN ref ON obj.address = ref.parent WHERE ref.child = ?1 ORDER BY ref.seq",
        OBJECT_SELECT
    );
    let mut stmt = store.connection().prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![sql_int("address", address)?], object_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Objects referenced by `address`, once per reference, in reference order.
///
/// References to addresses with no object row are skipped.
pub fn children(store: &GraphStore, address: Address) -> Result<Vec<ObjectRow>> {
    let sql = format!(
        "{} JOIN ref ON obj.address = ref.child WHERE ref.parent = ?1 ORDER BY ref.seq",
        OBJECT_SELECT
    );
    let mut stmt = store.connection().prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![sql_int("address", address)?], object_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Neighbour addresses of `address`, dangling ones included.
fn neighbours(store: &GraphStore, address: Address, direction: Direction) -> Result<Vec<Address>> {
    let sql = match direction {
        Direction::Forward => "SELECT child FROM ref WHERE parent = ?1 ORDER BY seq",
        Direction::Reverse => "SELECT parent FROM ref WHERE child = ?1 ORDER BY seq",
    };
    let mut stmt = store.connection().prepare_cached(sql)?;
    let addresses = stmt
        .query_map(params![sql_int("address", address)?], |row| row.get::<_, i64>(0))?
        .map(|r| r.map(|a| a as Address))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(addresses)
}

/// Breadth-first walk from `start`, returning `(address, depth)` in visit order.
///
/// `start` itself is reported at depth 0 whether or not it has an object row.
pub fn reachable(
    store: &GraphStore,
    start: Address,
    direction: Direction,
    max_depth: Option<usize>,
    options: &QueryOptions,
) -> Result<Vec<(Address, usize)>> {
    let started = Instant::now();
    let deadline = options.deadline(started);

    let mut visited = HashSet::from([start]);
    let mut order = vec![(start, 0)];
    let mut frontier = vec![start];
    let mut depth = 0;

    while !frontier.is_empty() && max_depth.map_or(true, |max| depth < max) {
        options.checkpoint(deadline)?;
        depth += 1;

        let mut next = Vec::new();
        for address in frontier {
            for neighbour in neighbours(store, address, direction)? {
                if visited.insert(neighbour) {
                    order.push((neighbour, depth));
                    next.push(neighbour);
                }
            }
        }
        frontier = next;
    }

    if store.trace_enabled() {
        tracing::info!(
            target: "memsee::trace",
            start,
            ?direction,
            visited = order.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reachable"
        );
    }
    Ok(order)
}

/// Shortest path from `from` to each of `targets`.
///
/// One entry per target, in the order given; an unreachable target yields an
/// empty path. Paths include both ends.
pub fn shortest_paths(
    store: &GraphStore,
    from: Address,
    targets: &[Address],
    direction: Direction,
    options: &QueryOptions,
) -> Result<Vec<Vec<Address>>> {
    let started = Instant::now();
    let deadline = options.deadline(started);

    let mut predecessor: HashMap<Address, Option<Address>> = HashMap::from([(from, None)]);
    let mut pending: HashSet<Address> = targets.iter().copied().collect();
    pending.remove(&from);

    let mut queue = VecDeque::from([from]);
    while !queue.is_empty() && !pending.is_empty() {
        options.checkpoint(deadline)?;

        // One BFS level per iteration.
        for _ in 0..queue.len() {
            let Some(address) = queue.pop_front() else {
                break;
            };
            for neighbour in neighbours(store, address, direction)? {
                if predecessor.contains_key(&neighbour) {
                    continue;
                }
                predecessor.insert(neighbour, Some(address));
                pending.remove(&neighbour);
                queue.push_back(neighbour);
            }
        }
    }

    let paths = targets
        .iter()
        .map(|target| {
            let mut path = Vec::new();
            if !predecessor.contains_key(target) {
                return path;
            }
            let mut cursor = Some(*target);
            while let Some(address) = cursor {
                path.push(address);
                cursor = predecessor.get(&address).copied().flatten();
            }
            path.reverse();
            path
        })
        .collect();

    if store.trace_enabled() {
        tracing::info!(
            target: "memsee::trace",
            from,
            targets = targets.len(),
            ?direction,
            explored = predecessor.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "shortest_paths"
        );
    }
    Ok(paths)
}

/// Count ancestor types per generation above the objects matching `predicate`.
///
/// Generation 0 is the matching objects themselves. Each further generation
/// adds the parents of the previous one through edges not yet followed, without
/// climbing past objects whose type is in [`ANCESTOR_STOP_TYPES`]. An object
/// reached at several generations counts only at its highest one.
pub fn ancestor_types(
    store: &GraphStore,
    predicate: &Expr,
    options: &QueryOptions,
) -> Result<Vec<AncestorTypeCount>> {
    let started = Instant::now();
    let deadline = options.deadline(started);

    let compiled = compile_predicate(predicate, Collection::Objects)?;
    let sql = format!("SELECT obj.address, obj.type FROM obj WHERE {} ORDER BY obj.seq", compiled.sql);
    let conn = store.connection();

    let mut frontier: Vec<(Address, String)> = {
        let mut stmt = conn.prepare(&sql)?;
        let matching = stmt
            .query_map(rusqlite::params_from_iter(compiled.params.iter()), |row| {
                Ok((row.get::<_, i64>(0)? as Address, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        matching
    };

    let mut highest: HashMap<Address, (usize, String)> = frontier
        .iter()
        .map(|(address, type_name)| (*address, (0, type_name.clone())))
        .collect();
    let mut followed: HashSet<(Address, Address)> = HashSet::new();
    let mut generation = 0;

    let mut stmt = conn.prepare_cached(
        "SELECT ref.parent, obj.type FROM ref JOIN obj ON obj.address = ref.parent
          WHERE ref.child = ?1 ORDER BY ref.seq",
    )?;

    while !frontier.is_empty() {
        options.checkpoint(deadline)?;

        let mut next = Vec::new();
        let mut queued = HashSet::new();
        for (child, type_name) in &frontier {
            if ANCESTOR_STOP_TYPES.contains(&type_name.as_str()) {
                continue;
            }
            let parents = stmt
                .query_map(params![sql_int("address", *child)?], |row| {
                    Ok((row.get::<_, i64>(0)? as Address, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            for (parent, parent_type) in parents {
                if !followed.insert((parent, *child)) {
                    continue;
                }
                highest.insert(parent, (generation + 1, parent_type.clone()));
                if queued.insert(parent) {
                    next.push((parent, parent_type));
                }
            }
        }

        tracing::debug!(generation = generation + 1, found = next.len(), "ancestor generation");
        frontier = next;
        generation += 1;
    }

    let mut counts: BTreeMap<(usize, String), u64> = BTreeMap::new();
    for (generation, type_name) in highest.into_values() {
        *counts.entry((generation, type_name)).or_default() += 1;
    }

    if store.trace_enabled() {
        tracing::info!(
            target: "memsee::trace",
            sql = %sql,
            params = ?compiled.params,
            generations = generation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ancestor_types"
        );
    }

    Ok(counts
        .into_iter()
        .map(|((generation, type_name), count)| AncestorTypeCount {
            generation,
            type_name,
            count,
        })
        .collect())
}

/// Walk down from `address`, showing every child and descending only into
/// children held by a single reference.
///
/// The first entry is the object itself at depth 0. Returns an empty list
/// when `address` has no object row.
pub fn owned_subtree(
    store: &GraphStore,
    address: Address,
    options: &QueryOptions,
) -> Result<Vec<SubtreeEntry>> {
    let deadline = options.deadline(Instant::now());
    let conn = store.connection();

    let mut in_degree_stmt = conn.prepare_cached("SELECT count(*) FROM ref WHERE child = ?1")?;
    let mut in_degree = |address: Address| -> Result<u64> {
        let n = in_degree_stmt
            .query_row(params![sql_int("address", address)?], |row| row.get::<_, i64>(0))?;
        Ok(n as u64)
    };

    let Some(root) = store.get_object(address)? else {
        return Ok(Vec::new());
    };
    let mut entries = vec![SubtreeEntry {
        depth: 0,
        in_degree: in_degree(address)?,
        object: root,
        owned: true,
    }];

    let mut shown = HashSet::from([address]);
    let mut to_show = vec![address];
    let mut depth = 0;

    while !to_show.is_empty() {
        options.checkpoint(deadline)?;
        depth += 1;

        let mut level: Vec<ObjectRow> = Vec::new();
        let mut in_level = HashSet::new();
        for parent in &to_show {
            for child in children(store, *parent)? {
                if in_level.insert(child.address) {
                    level.push(child);
                }
            }
        }
        level.sort_by_key(|o| o.seq);

        let mut next = Vec::new();
        for object in level {
            let degree = in_degree(object.address)?;
            let owned = degree == 1;
            if owned && shown.insert(object.address) {
                next.push(object.address);
            }
            entries.push(SubtreeEntry {
                depth,
                object,
                in_degree: degree,
                owned,
            });
        }
        to_show = next;
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::ObjectRecord;
    use crate::query::expr::{col, lit};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// 10 -> 20 -> 30, 10 -> 40, 50 -> 40, 40 -> 999 (dangling)
    fn seeded(dir: &TempDir) -> GraphStore {
        let path = dir.path().join("heap.db");
        let mut store = GraphStore::create(&path, Arc::new(AtomicBool::new(false))).unwrap();
        store.begin_batch().unwrap();
        for (address, type_name) in [(10, "module"), (20, "dict"), (30, "str"), (40, "list"), (50, "Foo")] {
            store
                .insert_object(&ObjectRecord::new(address, type_name, 8))
                .unwrap();
        }
        for (parent, child) in [(10, 20), (20, 30), (10, 40), (50, 40), (40, 999)] {
            store.insert_reference(parent, child, None).unwrap();
        }
        store.commit_batch().unwrap();
        store
    }

    #[test]
    fn test_parents_and_children() {
        let dir = TempDir::new().unwrap();
        let store = seeded(&dir);

        let parents: Vec<Address> = parents(&store, 40).unwrap().iter().map(|o| o.address).collect();
        assert_eq!(parents, vec![10, 50]);

        let kids: Vec<Address> = children(&store, 40).unwrap().iter().map(|o| o.address).collect();
        assert!(kids.is_empty(), "dangling child has no object row");
    }

    #[test]
    fn test_reachable_includes_dangling() {
        let dir = TempDir::new().unwrap();
        let store = seeded(&dir);

        let reached = reachable(&store, 10, Direction::Forward, None, &QueryOptions::default()).unwrap();
        assert_eq!(reached, vec![(10, 0), (20, 1), (40, 1), (30, 2), (999, 2)]);

        let shallow =
            reachable(&store, 10, Direction::Forward, Some(1), &QueryOptions::default()).unwrap();
        assert_eq!(shallow.len(), 3);
    }

    #[test]
    fn test_shortest_paths_both_directions() {
        let dir = TempDir::new().unwrap();
        let store = seeded(&dir);

        let paths =
            shortest_paths(&store, 10, &[30, 50], Direction::Forward, &QueryOptions::default()).unwrap();
        assert_eq!(paths, vec![vec![10, 20, 30], vec![]]);

        let back =
            shortest_paths(&store, 999, &[50], Direction::Reverse, &QueryOptions::default()).unwrap();
        assert_eq!(back, vec![vec![999, 40, 50]]);
    }

    #[test]
    fn test_ancestor_types_stop_at_module() {
        let dir = TempDir::new().unwrap();
        let store = seeded(&dir);

        let counts =
            ancestor_types(&store, &col("type").eq(lit("str")), &QueryOptions::default()).unwrap();
        let flat: Vec<(usize, &str, u64)> = counts
            .iter()
            .map(|c| (c.generation, c.type_name.as_str(), c.count))
            .collect();
        assert_eq!(flat, vec![(0, "str", 1), (1, "dict", 1), (2, "module", 1)]);
    }

    #[test]
    fn test_owned_subtree_descends_only_single_owner() {
        let dir = TempDir::new().unwrap();
        let store = seeded(&dir);

        let entries = owned_subtree(&store, 10, &QueryOptions::default()).unwrap();
        let flat: Vec<(usize, Address, bool)> = entries
            .iter()
            .map(|e| (e.depth, e.object.address, e.owned))
            .collect();
        // 40 has two holders, so its own children are not shown.
        assert_eq!(flat, vec![(0, 10, true), (1, 20, true), (1, 40, false), (2, 30, true)]);
    }

    #[test]
    fn test_owned_subtree_missing_object() {
        let dir = TempDir::new().unwrap();
        let store = seeded(&dir);
        assert!(owned_subtree(&store, 12345, &QueryOptions::default()).unwrap().is_empty());
    }
}
