//! JSON output types for CLI commands
//!
//! Every JSON response is wrapped in a [`JsonResponse`] envelope carrying the
//! schema version and an execution id so scripted callers can detect format
//! changes and correlate runs.

use serde::{Deserialize, Serialize};

use crate::error::MemseeError;
use crate::ingest::log::IngestRunRecord;
use crate::marker::MarkReport;
use crate::query::traverse::{AncestorTypeCount, SubtreeEntry};
use crate::query::ResultSet;
use crate::session::SessionStats;
use crate::store::ObjectRow;

/// Current JSON output schema version
pub const MEMSEE_JSON_SCHEMA_VERSION: &str = "1.0.0";

/// Wrapper for all JSON responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse<T> {
    /// Schema version for parsing stability
    pub schema_version: String,
    /// Unique execution ID for this run
    pub execution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// RFC 3339, seconds precision, UTC
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Response data
    pub data: T,
    /// Whether the response is partial (e.g. cancelled ingestion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
}

impl<T> JsonResponse<T> {
    pub fn new(data: T, execution_id: &str) -> Self {
        JsonResponse {
            schema_version: MEMSEE_JSON_SCHEMA_VERSION.to_string(),
            execution_id: execution_id.to_string(),
            tool: Some("memsee".to_string()),
            timestamp: Some(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
            data,
            partial: None,
        }
    }

    /// Mark the response as partial
    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = Some(partial);
        self
    }
}

/// Response for stats command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub path: String,
    #[serde(flatten)]
    pub stats: SessionStats,
}

/// Response for query and types commands
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub columns: Vec<String>,
    pub rows: Vec<crate::query::Row>,
    pub row_count: usize,
}

impl From<ResultSet> for QueryResponse {
    fn from(result: ResultSet) -> Self {
        QueryResponse {
            row_count: result.rows.len(),
            columns: result.columns,
            rows: result.rows,
        }
    }
}

/// Response for parents and info commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectsResponse {
    pub address: u64,
    pub objects: Vec<ObjectRow>,
}

/// Response for kids command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtreeResponse {
    pub address: u64,
    pub entries: Vec<SubtreeEntry>,
}

/// One resolved path: the addresses plus whatever object rows exist for them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathMatch {
    pub target: u64,
    pub addresses: Vec<u64>,
    pub objects: Vec<ObjectRow>,
}

/// Response for path command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathResponse {
    pub from: u64,
    pub reversed: bool,
    pub paths: Vec<PathMatch>,
}

/// Response for ancestors command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AncestorsResponse {
    pub generations: Vec<AncestorTypeCount>,
}

/// Response for names command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamesResponse {
    pub names: Vec<NamedValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: String,
}

/// Response for history command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub runs: Vec<IngestRunRecord>,
}

/// Response for mark and pin commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkResponse {
    /// Objects newly designated top by `pin`; absent for `mark`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<u64>,
    pub report: MarkReport,
}

/// Response for backup and restore commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupResponse {
    pub path: String,
    pub backup: String,
}

/// Response for errors in JSON mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error code (`MSE-...`) or a generic category
    pub error: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    /// Build from any error, using the memsee code when there is one.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let error = err
            .downcast_ref::<MemseeError>()
            .map(|e| e.code().to_string())
            .unwrap_or_else(|| "error".to_string());
        ErrorResponse {
            error,
            message: format!("{:#}", err),
        }
    }
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Human,
    /// JSON output with schema versioning
    Json,
}

impl OutputFormat {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Some(OutputFormat::Human),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Generate a unique execution ID for this run
///
/// Uses timestamp + process ID for uniqueness.
pub fn generate_execution_id() -> String {
    use std::process;
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let pid = process::id();

    format!("{:x}-{:x}", timestamp, pid)
}

/// Output JSON to stdout
pub fn output_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("text"), Some(OutputFormat::Human));
        assert_eq!(OutputFormat::from_str("yaml"), None);
    }

    #[test]
    fn test_envelope_fields() {
        let response = JsonResponse::new(NamesResponse { names: vec![] }, "abc-1");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["schema_version"], MEMSEE_JSON_SCHEMA_VERSION);
        assert_eq!(json["execution_id"], "abc-1");
        assert_eq!(json["tool"], "memsee");
        assert!(json.get("partial").is_none());

        let partial = serde_json::to_value(response.with_partial(true)).unwrap();
        assert_eq!(partial["partial"], true);
    }

    #[test]
    fn test_execution_id_shape() {
        let id = generate_execution_id();
        assert_eq!(id.split('-').count(), 2);
    }

    #[test]
    fn test_error_response_uses_code() {
        let err = anyhow::Error::new(MemseeError::QueryCancelled);
        let response = ErrorResponse::from_error(&err);
        assert_eq!(response.error, crate::error_codes::MSE_QRY_002_CANCELLED);
    }

    #[test]
    fn test_stats_flatten() {
        let response = StatsResponse {
            path: "heap.db".to_string(),
            stats: SessionStats {
                objects: 3,
                references: 2,
                total_bytes: 142,
                roots: 1,
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["objects"], 3);
        assert_eq!(json["path"], "heap.db");
    }
}
