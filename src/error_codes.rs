//! Memsee-specific error codes
//!
//! Error codes follow the pattern: MSE-{CATEGORY}-{3-digit number}
//!
//! Categories (1-3 uppercase letters):
//! - DMP: Dump-related conditions (malformed records, conflicting duplicates)
//! - ING: Ingestion-related errors (commit failures, concurrent writers)
//! - SES: Session lifecycle errors (create/open, backup/restore)
//! - QRY: Query-related errors (invalid expressions, cancellation)
//! - IO: I/O and storage errors
//!
//! Each error code is stable and should not be reused.

/// Malformed dump record
pub const MSE_DMP_001_MALFORMED_RECORD: &str = "MSE-DMP-001";

/// Duplicate address with conflicting attributes
pub const MSE_DMP_002_CONFLICTING_DUPLICATE: &str = "MSE-DMP-002";

/// A batch failed to persist
pub const MSE_ING_001_COMMIT_FAILURE: &str = "MSE-ING-001";

/// Another writer is active on the session
pub const MSE_ING_002_SESSION_BUSY: &str = "MSE-ING-002";

/// Store already exists at the create path
pub const MSE_SES_001_SESSION_EXISTS: &str = "MSE-SES-001";

/// File is not a memsee store (or has an unexpected schema)
pub const MSE_SES_002_INCOMPATIBLE_STORE: &str = "MSE-SES-002";

/// A backup already exists next to the store
pub const MSE_SES_003_BACKUP_EXISTS: &str = "MSE-SES-003";

/// No backup to restore from
pub const MSE_SES_004_NO_BACKUP: &str = "MSE-SES-004";

/// Invalid query expression
pub const MSE_QRY_001_INVALID_QUERY: &str = "MSE-QRY-001";

/// Query cancelled or timed out
pub const MSE_QRY_002_CANCELLED: &str = "MSE-QRY-002";

/// Filesystem or stream I/O failure
pub const MSE_IO_001_IO_FAILURE: &str = "MSE-IO-001";

/// Underlying SQLite storage failure
pub const MSE_IO_002_STORAGE_FAILURE: &str = "MSE-IO-002";

/// Error code documentation
///
/// # Dump Conditions (MSE-DMP-*)
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | MSE-DMP-001 | Malformed dump record | Inspect the reported byte offset; re-run without `--strict` to skip it |
/// | MSE-DMP-002 | Conflicting duplicate address | The dump reused an address; last write wins |
///
/// # Ingestion Errors (MSE-ING-*)
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | MSE-ING-001 | Batch commit failure | Re-ingest the reported record range |
/// | MSE-ING-002 | Session busy | Wait for the running ingestion to finish or cancel it |
///
/// # Session Errors (MSE-SES-*)
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | MSE-SES-001 | Store already exists | Use `open`, or create with truncation |
/// | MSE-SES-002 | Incompatible store | Recreate the store with `memsee create` |
/// | MSE-SES-003 | Backup already exists | Remove the `.bak` file to take a new backup |
/// | MSE-SES-004 | No backup | Run `memsee backup` first |
///
/// # Query Errors (MSE-QRY-*)
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | MSE-QRY-001 | Invalid query | Check collection, alias and column names |
/// | MSE-QRY-002 | Query cancelled | Narrow the query or raise the timeout |
///
/// # I/O Errors (MSE-IO-*)
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | MSE-IO-001 | I/O failure | Check file path and permissions |
/// | MSE-IO-002 | Storage failure | Check disk space; the store may be locked or corrupt |
pub const ERROR_CODE_DOCUMENTATION: &str = "Error code documentation available in source";
