//! REST API types for frontend integration.
//!
//! All responses use camelCase keys. Row previews are plain JSON objects
//! keyed by column name, in column order.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{ColumnType, Table};
use crate::session::{LoadedTable, TableSource};
use crate::stats::{describe, ColumnSummary};
use crate::transform::{controls, ControlOptions, PipelineRun, StepReport};

/// Returned when a session is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: Uuid,
}

/// Name and inferred type of a column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: ColumnType,
}

/// Shape and leading rows of a table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePreview {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<ColumnInfo>,
    pub preview: Vec<Value>,
}

impl TablePreview {
    pub fn new(table: &Table, preview_rows: usize) -> Self {
        Self {
            row_count: table.row_count(),
            column_count: table.column_count(),
            columns: table
                .columns()
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name().to_string(),
                    dtype: c.dtype(),
                })
                .collect(),
            preview: table.head(preview_rows).to_records(),
        }
    }
}

/// The session's current table plus the choices the transform form offers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResponse {
    pub status: String,
    pub source: TableSource,
    pub encoding: String,
    pub loaded_at: String,
    #[serde(flatten)]
    pub table: TablePreview,
    pub controls: ControlOptions,
}

impl TableResponse {
    pub fn new(loaded: &LoadedTable, preview_rows: usize) -> Self {
        Self {
            status: "ready".to_string(),
            source: loaded.source.clone(),
            encoding: loaded.encoding.clone(),
            loaded_at: loaded.loaded_at.to_rfc3339(),
            table: TablePreview::new(&loaded.table, preview_rows),
            controls: controls(&loaded.table),
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    /// "ready", or "warning" when an enabled step could not apply
    pub status: String,
    #[serde(flatten)]
    pub table: TablePreview,
    pub steps: Vec<StepReport>,
    pub summary: Vec<ColumnSummary>,
}

impl TransformResponse {
    pub fn new(run: &PipelineRun, preview_rows: usize) -> Self {
        let status = if run.skipped().next().is_none() {
            "ready"
        } else {
            "warning"
        };
        Self {
            status: status.to_string(),
            table: TablePreview::new(&run.table, preview_rows),
            steps: run.steps.clone(),
            summary: describe(&run.table),
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::transform::{run_at, DepartmentFilter, TransformRequest};
    use chrono::NaiveDate;

    #[test]
    fn test_table_response_shape() {
        let mut session = Session::new();
        let loaded = session.load_sample().unwrap();
        let value = serde_json::to_value(TableResponse::new(loaded, 3)).unwrap();

        assert_eq!(value["status"], "ready");
        assert_eq!(value["source"]["kind"], "sample");
        assert_eq!(value["rowCount"], 10);
        assert_eq!(value["columnCount"], 5);
        assert_eq!(value["preview"].as_array().unwrap().len(), 3);
        assert_eq!(value["columns"][2], json!({"name": "age", "dtype": "number"}));
        assert!(value["controls"]["departments"]
            .as_array()
            .unwrap()
            .contains(&json!("Engineering")));
    }

    #[test]
    fn test_transform_response_status() {
        let table = crate::parser::parse_str("name,department\nAnn,Eng\nBo,Ops\n", ',').unwrap();
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        let request = TransformRequest {
            department: Some(DepartmentFilter::equals("Eng")),
            ..Default::default()
        };
        let response = TransformResponse::new(&run_at(&table, &request, now).unwrap(), 5);
        assert_eq!(response.status, "ready");
        assert_eq!(response.table.row_count, 1);

        let request = TransformRequest {
            salary_bonus: true,
            ..Default::default()
        };
        let result = run_at(&table, &request, now).unwrap();
        let value = serde_json::to_value(TransformResponse::new(&result, 5)).unwrap();
        assert_eq!(value["status"], "warning");
        assert_eq!(value["steps"][0]["status"], "notApplicable");
        assert_eq!(value["steps"][0]["step"], "salaryBonus");
    }

    #[test]
    fn test_error_response() {
        let value = error_response("Session not found: x");
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "Session not found: x");
    }
}
