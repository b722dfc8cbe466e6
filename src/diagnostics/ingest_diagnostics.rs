//! Ingestion diagnostics: non-fatal conditions recorded while loading a dump.
//!
//! Malformed records, conflicting duplicate addresses and batches that failed
//! to commit are collected into the [`IngestionReport`](crate::IngestionReport)
//! instead of aborting the run. Ordering is deterministic: by record index,
//! then by kind.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::ParseError;
use crate::Address;

/// One attribute that differs between a stored object and a re-ingested
/// record with the same address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub previous: String,
    pub incoming: String,
}

/// Duplicate address with conflicting attributes (last write wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQualityWarning {
    /// Record index of the overwriting record
    pub record: u64,
    pub address: Address,
    pub conflicts: Vec<FieldConflict>,
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self
            .conflicts
            .iter()
            .map(|c| format!("{} {} -> {}", c.field, c.previous, c.incoming))
            .collect();
        write!(
            f,
            "address {} re-ingested at record #{} with different {}",
            self.address,
            self.record,
            fields.join(", ")
        )
    }
}

/// A batch whose rows did not land in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedBatch {
    /// 0-based batch index within the run
    pub index: usize,
    /// First and last record index covered by the batch (inclusive)
    pub first_record: u64,
    pub last_record: u64,
    pub objects: usize,
    pub references: usize,
    pub reason: String,
}

impl fmt::Display for FailedBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch {} (records {}..={}, {} objects, {} refs): {}",
            self.index,
            self.first_record,
            self.last_record,
            self.objects,
            self.references,
            self.reason
        )
    }
}

/// A diagnostic event from the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestDiagnostic {
    /// Record skipped because it could not be decoded
    Malformed(ParseError),
    /// Record overwrote an object with different attributes
    Conflict(DataQualityWarning),
    /// Batch rolled back after a commit failure
    BatchLost(FailedBatch),
}

impl IngestDiagnostic {
    /// Record index the diagnostic is anchored at.
    pub fn record(&self) -> u64 {
        match self {
            IngestDiagnostic::Malformed(e) => e.record,
            IngestDiagnostic::Conflict(w) => w.record,
            IngestDiagnostic::BatchLost(b) => b.first_record,
        }
    }

    /// Stable sort key for deterministic ordering.
    ///
    /// Primary: record index
    /// Secondary: variant (lost batches, then malformed records, then conflicts)
    pub fn sort_key(&self) -> (u64, u8) {
        match self {
            IngestDiagnostic::BatchLost(b) => (b.first_record, 0),
            IngestDiagnostic::Malformed(e) => (e.record, 1),
            IngestDiagnostic::Conflict(w) => (w.record, 2),
        }
    }

    /// Format for human-readable stderr output.
    ///
    /// Examples:
    /// - "SKIP malformed dump record #3 at byte 120: expected value"
    /// - "LOST batch 2 (records 20..=29, 10 objects, 14 refs): no transaction is active"
    pub fn format_stderr(&self) -> String {
        match self {
            IngestDiagnostic::Malformed(e) => format!("SKIP {}", e),
            IngestDiagnostic::Conflict(w) => format!("WARN {}", w),
            IngestDiagnostic::BatchLost(b) => format!("LOST {}", b),
        }
    }
}

impl fmt::Display for IngestDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_stderr())
    }
}

impl PartialOrd for IngestDiagnostic {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IngestDiagnostic {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed(record: u64) -> IngestDiagnostic {
        IngestDiagnostic::Malformed(ParseError {
            record,
            offset: record * 10,
            message: "expected value".to_string(),
        })
    }

    fn lost(first: u64) -> IngestDiagnostic {
        IngestDiagnostic::BatchLost(FailedBatch {
            index: 1,
            first_record: first,
            last_record: first + 9,
            objects: 10,
            references: 14,
            reason: "no transaction is active".to_string(),
        })
    }

    #[test]
    fn test_sorting_is_by_record_then_kind() {
        let conflict = IngestDiagnostic::Conflict(DataQualityWarning {
            record: 10,
            address: 42,
            conflicts: vec![],
        });
        let mut diagnostics = vec![malformed(12), conflict, lost(10), malformed(3)];
        diagnostics.sort();

        assert_eq!(diagnostics[0].record(), 3);
        assert!(matches!(diagnostics[1], IngestDiagnostic::BatchLost(_)));
        assert!(matches!(diagnostics[2], IngestDiagnostic::Conflict(_)));
        assert_eq!(diagnostics[3].record(), 12);
    }

    #[test]
    fn test_format_stderr_lost_batch() {
        assert_eq!(
            lost(20).format_stderr(),
            "LOST batch 1 (records 20..=29, 10 objects, 14 refs): no transaction is active"
        );
    }

    #[test]
    fn test_warning_display_lists_fields() {
        let warning = DataQualityWarning {
            record: 5,
            address: 1000,
            conflicts: vec![FieldConflict {
                field: "size".to_string(),
                previous: "28".to_string(),
                incoming: "32".to_string(),
            }],
        };
        assert_eq!(
            warning.to_string(),
            "address 1000 re-ingested at record #5 with different size 28 -> 32"
        );
    }
}
