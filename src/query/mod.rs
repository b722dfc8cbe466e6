//! Query engine.
//!
//! Analyst queries are expression trees ([`Query`]) over the two collections,
//! validated and compiled to parameterized SQL, then run on a reader
//! connection. The engine never creates tables; everything it needs is in the
//! store schema.

pub mod compile;
pub mod exec;
pub mod expr;
pub mod patterns;
pub mod result;
pub mod traverse;

pub use compile::{compile, validate_identifier, CompiledQuery};
pub use exec::{execute, QueryOptions, QUERY_ROW_BATCH};
pub use expr::{
    aggregate, col, col_of, count_star, exists, lit, AggregateFunc, BinaryOp, Collection, Expr,
    Join, JoinKind, OrderBy, Query, Relation, SelectItem,
};
pub use result::{ResultSet, Row, Value};
pub use traverse::{AncestorTypeCount, Direction, SubtreeEntry};
