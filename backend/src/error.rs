//! Error types for the Tablesmith load → transform → export pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`TableError`] - Table invariant violations
//! - [`LoadError`] - CSV loading errors
//! - [`TransformError`] - Pipeline step failures
//! - [`ExportError`] - Payload encoding errors
//! - [`SessionError`] - Session lookup and state errors
//! - [`ConfigError`] - Environment configuration errors
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Table Errors
// =============================================================================

/// Violations of the table invariants (equal column lengths, unique names).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    /// A column does not have as many cells as the table has rows.
    #[error("Column '{column}' has {found} cells, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    /// Two columns share a name.
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),
}

// =============================================================================
// Load Errors
// =============================================================================

/// Errors while turning uploaded bytes into a table.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Content could not be decoded as text.
    #[error("Failed to decode content: {0}")]
    Encoding(String),

    /// The CSV reader rejected the content.
    #[error("Invalid CSV at line {line}: {message}")]
    Malformed { line: u64, message: String },

    /// A data row has more fields than the header.
    #[error("Line {line}: expected {expected} fields, saw {found}")]
    FieldCount {
        line: u64,
        expected: usize,
        found: usize,
    },

    /// Nothing to parse.
    #[error("No columns to parse from file")]
    EmptyInput,

    /// The parsed columns broke a table invariant.
    #[error("Invalid table: {0}")]
    Table(#[from] TableError),
}

// =============================================================================
// Transformation Errors
// =============================================================================

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A date column holds a value that is not a calendar date.
    #[error("Cannot parse '{value}' in column '{column}' (row {row}) as a date")]
    DateParse {
        column: String,
        row: usize,
        value: String,
    },

    /// A step that requires a column was pointed at one that does not exist.
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A derived column broke a table invariant.
    #[error("Invalid table: {0}")]
    Table(#[from] TableError),
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while encoding a table into a payload.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV writer error.
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    /// Spreadsheet container error.
    #[error("XLSX encoding failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// JSON serialization error.
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("Export IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown format name.
    #[error("Unknown export format: {0}")]
    UnknownFormat(String),
}

// =============================================================================
// Session Errors
// =============================================================================

/// Errors from the session context.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session with this id.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The session has no table loaded yet.
    #[error("No table loaded, upload a CSV file or load the sample data first")]
    NoTable,
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: String, value: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level orchestration errors.
///
/// Returned by [`crate::session::Session`] operations and the CLI. It wraps
/// all lower-level errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Load error.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Transformation error.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Export error.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl From<SessionError> for ServerError {
    fn from(err: SessionError) -> Self {
        ServerError::Pipeline(err.into())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for table construction.
pub type TableResult<T> = Result<T, TableError>;

/// Result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for transformation operations.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // LoadError -> PipelineError
        let load_err = LoadError::EmptyInput;
        let pipeline_err: PipelineError = load_err.into();
        assert!(pipeline_err.to_string().contains("No columns"));

        // TransformError -> PipelineError
        let transform_err = TransformError::MissingColumn("salary".into());
        let pipeline_err: PipelineError = transform_err.into();
        assert!(pipeline_err.to_string().contains("salary"));

        // SessionError -> ServerError
        let server_err: ServerError = SessionError::NoTable.into();
        assert!(matches!(
            server_err,
            ServerError::Pipeline(PipelineError::Session(SessionError::NoTable))
        ));
    }

    #[test]
    fn test_date_parse_error_format() {
        let err = TransformError::DateParse {
            column: "join_date".into(),
            row: 3,
            value: "yesterday".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("join_date"));
        assert!(msg.contains("row 3"));
        assert!(msg.contains("yesterday"));
    }
}
