//! # Tablesmith - CSV load, transform and export
//!
//! Tablesmith loads a CSV file into a typed in-memory table, runs a fixed
//! sequence of optional transformations over it and encodes the result as
//! CSV, XLSX or JSON.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│  Pipeline   │────▶│   Export    │
//! │  (ISO/UTF8) │     │  (typed)    │     │  (6 steps)  │     │ csv/xlsx/js │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tablesmith::{export, parse_file, run, ExportFormat, LoadOptions, TransformRequest};
//!
//! let parsed = parse_file("staff.csv", &LoadOptions::default())?;
//! let request = TransformRequest { salary_bonus: true, ..Default::default() };
//! let result = run(&parsed.table, &request)?;
//! let payload = export(&result.table, ExportFormat::Xlsx)?;
//! std::fs::write(&payload.file_name, &payload.bytes)?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Cells, columns and tables
//! - [`parser`] - CSV loading with encoding detection
//! - [`transform`] - Transformation steps and pipeline
//! - [`export`] - CSV / XLSX / JSON encoders
//! - [`stats`] - Summary statistics
//! - [`session`] - Per-user working context
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Loading
pub mod parser;

// Transformation
pub mod transform;

// Output
pub mod export;
pub mod stats;

// Sessions
pub mod session;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ExportError, LoadError, PipelineError, ServerError, SessionError, TableError,
    TransformError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{Cell, Column, ColumnType, Table};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_encoding, parse_bytes, parse_file, parse_str, LoadOptions, ParseResult,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::{
    controls, run, run_at, AgeFilter, Bounds, ControlOptions, DepartmentFilter, PipelineRun,
    SalaryBonus, Sort, SortOrder, StepKind, StepOutcome, StepReport, TransformRequest, Uppercase,
    YearsOfService,
};

// =============================================================================
// Re-exports - Export
// =============================================================================

pub use export::{export, export_all, export_named, ExportFormat, ExportPayload};

// =============================================================================
// Re-exports - Stats, Sessions, Config
// =============================================================================

pub use config::AppConfig;
pub use session::{sample_table, LoadedTable, Session, SessionStore, TableSource};
pub use stats::{describe, ColumnSummary};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{
    error_response, ColumnInfo, SessionResponse, TablePreview, TableResponse, TransformResponse,
};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
