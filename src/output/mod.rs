//! Output module for CLI commands
//!
//! JSON responses are schema-versioned; human output is aligned text.

pub mod command;
pub mod human;

pub use command::{
    generate_execution_id, output_json, AncestorsResponse, BackupResponse, ErrorResponse, HistoryResponse,
    JsonResponse, MarkResponse, NamedValue, NamesResponse, ObjectsResponse, OutputFormat,
    PathMatch, PathResponse, QueryResponse, StatsResponse, SubtreeResponse,
};
pub use human::{object_cells, object_columns, render_table, CellFormatter, Count};
