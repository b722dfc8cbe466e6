//! Structured diagnostics for memsee ingestion.
//!
//! Provides deterministic, sortable diagnostic types for skipped records,
//! conflicting duplicates and lost batches.

pub mod ingest_diagnostics;

pub use ingest_diagnostics::{DataQualityWarning, FailedBatch, FieldConflict, IngestDiagnostic};
