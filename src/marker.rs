//! Top/root marker.
//!
//! Flags structurally significant objects: graph roots (no incoming
//! reference anywhere in the store) and objects designated `top`, either by
//! the dump itself or by [`pin_objects`]. Every other object is cleared, so
//! running the marker twice over the same data yields the same flag set.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::query::compile::compile_predicate;
use crate::query::expr::{Collection, Expr};
use crate::store::GraphStore;

/// Counts from one marking pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReport {
    /// Objects with in-degree zero
    pub roots: u64,
    /// Objects carrying the `top` flag
    pub designated: u64,
    /// Objects flagged after the pass (roots and designated, without double counting)
    pub marked: u64,
}

/// Recompute `mark` for every object in one statement.
///
/// Must run inside an open batch.
pub fn mark_top_objects(store: &GraphStore) -> Result<MarkReport> {
    let conn = store.connection();

    conn.execute(
        "UPDATE obj SET mark = CASE
            WHEN top = 1 THEN 1
            WHEN NOT EXISTS (SELECT 1 FROM ref WHERE ref.child = obj.address) THEN 1
            ELSE 0
         END",
        [],
    )?;

    let roots: i64 = conn.query_row(
        "SELECT count(*) FROM obj
          WHERE NOT EXISTS (SELECT 1 FROM ref WHERE ref.child = obj.address)",
        [],
        |row| row.get(0),
    )?;
    let designated: i64 =
        conn.query_row("SELECT count(*) FROM obj WHERE top = 1", [], |row| row.get(0))?;

    let report = MarkReport {
        roots: roots as u64,
        designated: designated as u64,
        marked: store.count_marked()?,
    };
    tracing::debug!(?report, "marking pass");
    Ok(report)
}

/// Designate every object matching `predicate` as top and mark it.
///
/// The predicate is evaluated over `obj` (alias `obj`). Must run inside an
/// open batch. Returns the number of objects pinned.
pub fn pin_objects(store: &GraphStore, predicate: &Expr) -> Result<u64> {
    let compiled = compile_predicate(predicate, Collection::Objects)?;
    let sql = format!("UPDATE obj SET top = 1, mark = 1 WHERE {}", compiled.sql);

    if store.trace_enabled() {
        tracing::info!(target: "memsee::trace", sql = %sql, params = ?compiled.params, "pin");
    }

    let n = store
        .connection()
        .execute(&sql, rusqlite::params_from_iter(compiled.params.iter()))?;
    Ok(n as u64)
}
