//! Fixed-order transformation pipeline.
//!
//! Steps run in this order, each only when enabled in the
//! [`TransformRequest`]:
//!
//! ```text
//! uppercase → salary bonus → years of service → department filter → age filter → sort
//! ```
//!
//! Every step sees the table as left by the earlier ones, so a sort by
//! `years_of_service` only works when that step is enabled too.
//!
//! # Example
//!
//! ```rust,ignore
//! use tablesmith::{parse_str, run, DepartmentFilter, TransformRequest};
//!
//! let table = parse_str("name,department\nAnn,Eng\nCy,Sales\n", ',')?;
//! let request = TransformRequest {
//!     department: Some(DepartmentFilter::equals("Eng")),
//!     ..Default::default()
//! };
//! let result = run(&table, &request)?;
//! assert_eq!(result.table.row_count(), 1);
//! ```

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::steps::{
    AgeFilter, Bounds, DepartmentFilter, SalaryBonus, Sort, StepKind, StepOutcome, StepReport,
    Uppercase, YearsOfService, DEPARTMENT_COLUMN,
};
use crate::api::logs::{log_info, log_success, log_warning};
use crate::error::TransformResult;
use crate::models::Table;

/// The user's choices for one pipeline run. `None` / `false` disables a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformRequest {
    pub uppercase: Option<Uppercase>,
    pub salary_bonus: bool,
    pub years_of_service: bool,
    pub department: Option<DepartmentFilter>,
    pub age_range: Option<AgeFilter>,
    pub sort: Option<Sort>,
}

impl TransformRequest {
    /// Whether no step is enabled.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Derived table plus one report per enabled step.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub table: Table,
    pub steps: Vec<StepReport>,
}

impl PipelineRun {
    /// Reports of the steps whose precondition was not met.
    pub fn skipped(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|r| !r.outcome.is_applied())
    }
}

/// Choices the form offers for a given table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlOptions {
    /// Columns the uppercase step accepts.
    pub text_columns: Vec<String>,
    /// Distinct `department` values.
    pub departments: Vec<String>,
    /// Observed `age` range, when `age` is numeric.
    pub age_bounds: Option<Bounds>,
    /// Every column, for the sort selector.
    pub sort_columns: Vec<String>,
}

/// Resolve the selector contents for a table.
pub fn controls(table: &Table) -> ControlOptions {
    ControlOptions {
        text_columns: table.text_columns(),
        departments: table.distinct_values(DEPARTMENT_COLUMN),
        age_bounds: AgeFilter::observed_bounds(table),
        sort_columns: table.column_names(),
    }
}

/// Run the pipeline against the current local time.
pub fn run(table: &Table, request: &TransformRequest) -> TransformResult<PipelineRun> {
    run_at(table, request, Local::now().naive_local())
}

/// Run the pipeline with an explicit "now" for the years-of-service step.
///
/// The input table is never modified; a new table is derived.
pub fn run_at(
    table: &Table,
    request: &TransformRequest,
    now: NaiveDateTime,
) -> TransformResult<PipelineRun> {
    let mut working = table.clone();
    let mut steps = Vec::new();

    if request.is_empty() {
        log_info("No transformations enabled");
    }

    if let Some(step) = &request.uppercase {
        let outcome = step.apply(&mut working)?;
        steps.push(report(StepKind::Uppercase, outcome));
    }

    if request.salary_bonus {
        let outcome = SalaryBonus.apply(&mut working)?;
        steps.push(report(StepKind::SalaryBonus, outcome));
    }

    if request.years_of_service {
        let outcome = YearsOfService.apply(&mut working, now)?;
        steps.push(report(StepKind::YearsOfService, outcome));
    }

    if let Some(step) = &request.department {
        let outcome = step.apply(&mut working)?;
        steps.push(report(StepKind::DepartmentFilter, outcome));
    }

    if let Some(step) = &request.age_range {
        let outcome = step.apply(&mut working)?;
        steps.push(report(StepKind::AgeFilter, outcome));
    }

    if let Some(step) = &request.sort {
        let outcome = step.apply(&mut working)?;
        steps.push(report(StepKind::Sort, outcome));
    }

    log_info(format!(
        "Result: {} rows × {} columns",
        working.row_count(),
        working.column_count()
    ));

    Ok(PipelineRun {
        table: working,
        steps,
    })
}

fn report(step: StepKind, outcome: StepOutcome) -> StepReport {
    match &outcome {
        StepOutcome::Applied { detail } => log_success(format!("{}: {}", step, detail)),
        StepOutcome::NotApplicable { reason } => {
            log_warning(format!("{} skipped: {}", step, reason))
        }
    }
    StepReport { step, outcome }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;
    use crate::models::Cell;
    use crate::parser::parse_str;
    use crate::transform::steps::{SortOrder, BONUS_COLUMN, YEARS_OF_SERVICE_COLUMN};
    use chrono::NaiveDate;

    fn staff() -> Table {
        parse_str(
            "name,department,age,salary,join_date\n\
             Ann,Eng,30,50000,2020-01-01\n\
             Bo,Eng,45,70000,2019-06-15\n\
             Cy,Sales,25,40000,2021-03-10\n",
            ',',
        )
        .unwrap()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn names(table: &Table) -> Vec<String> {
        table
            .column("name")
            .unwrap()
            .cells()
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    #[test]
    fn test_identity_when_nothing_enabled() {
        let table = staff();
        let request = TransformRequest::default();
        assert!(request.is_empty());

        let result = run_at(&table, &request, now()).unwrap();
        assert_eq!(result.table, table);
        assert!(result.steps.is_empty());
    }

    #[test]
    fn test_scenario_department_eng() {
        let request = TransformRequest {
            department: Some(DepartmentFilter::equals("Eng")),
            ..Default::default()
        };
        let result = run_at(&staff(), &request, now()).unwrap();
        assert_eq!(names(&result.table), vec!["Ann", "Bo"]);
    }

    #[test]
    fn test_scenario_age_range() {
        let request = TransformRequest {
            age_range: Some(AgeFilter::between(28, 40)),
            ..Default::default()
        };
        let result = run_at(&staff(), &request, now()).unwrap();
        assert_eq!(names(&result.table), vec!["Ann"]);
    }

    #[test]
    fn test_scenario_bonus_with_filter() {
        let request = TransformRequest {
            salary_bonus: true,
            department: Some(DepartmentFilter::equals("Eng")),
            ..Default::default()
        };
        let result = run_at(&staff(), &request, now()).unwrap();
        let bonus = result.table.column(BONUS_COLUMN).unwrap().cells();
        assert_eq!(bonus.len(), 2);
        assert!((bonus[0].as_f64().unwrap() - 55000.0).abs() < 1e-6);
        assert!((bonus[1].as_f64().unwrap() - 77000.0).abs() < 1e-6);
    }

    #[test]
    fn test_input_table_untouched() {
        let table = staff();
        let request = TransformRequest {
            uppercase: Some(Uppercase::on("name")),
            salary_bonus: true,
            ..Default::default()
        };
        let result = run_at(&table, &request, now()).unwrap();
        assert_eq!(names(&table), vec!["Ann", "Bo", "Cy"]);
        assert_eq!(names(&result.table), vec!["ANN", "BO", "CY"]);
        assert!(!table.has_column(BONUS_COLUMN));
    }

    #[test]
    fn test_sort_sees_derived_column() {
        let request = TransformRequest {
            years_of_service: true,
            sort: Some(Sort::by(YEARS_OF_SERVICE_COLUMN, SortOrder::Descending)),
            ..Default::default()
        };
        let result = run_at(&staff(), &request, now()).unwrap();
        assert_eq!(names(&result.table), vec!["Bo", "Ann", "Cy"]);
        assert!(result.steps.iter().all(|r| r.outcome.is_applied()));
    }

    #[test]
    fn test_sort_on_derived_column_without_step_fails() {
        let request = TransformRequest {
            sort: Some(Sort::by(YEARS_OF_SERVICE_COLUMN, SortOrder::Ascending)),
            ..Default::default()
        };
        let err = run_at(&staff(), &request, now()).unwrap_err();
        assert!(matches!(err, TransformError::MissingColumn(_)));
    }

    #[test]
    fn test_department_filter_after_uppercase() {
        let request = TransformRequest {
            uppercase: Some(Uppercase::on("department")),
            department: Some(DepartmentFilter::default()),
            ..Default::default()
        };
        let result = run_at(&staff(), &request, now()).unwrap();
        assert_eq!(names(&result.table), vec!["Ann", "Bo"]);
        assert_eq!(result.table.row(0)[1], &Cell::Text("ENG".into()));
    }

    #[test]
    fn test_not_applicable_steps_are_reported() {
        let table = parse_str("name,city\nAnn,Oslo\n", ',').unwrap();
        let request = TransformRequest {
            salary_bonus: true,
            years_of_service: true,
            department: Some(DepartmentFilter::default()),
            age_range: Some(AgeFilter::default()),
            ..Default::default()
        };
        let result = run_at(&table, &request, now()).unwrap();
        assert_eq!(result.table, table);
        assert_eq!(result.steps.len(), 4);
        assert_eq!(result.skipped().count(), 4);
        assert_eq!(result.steps[0].step, StepKind::SalaryBonus);
    }

    #[test]
    fn test_request_from_json() {
        let json = r#"{
            "uppercase": {"column": "name"},
            "salaryBonus": true,
            "ageRange": {"lower": 20},
            "sort": {"column": "age", "order": "descending"}
        }"#;
        let request: TransformRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.uppercase, Some(Uppercase::on("name")));
        assert!(request.salary_bonus);
        assert!(!request.years_of_service);
        assert_eq!(request.age_range.unwrap().upper, None);
        assert_eq!(request.sort.unwrap().order, SortOrder::Descending);
    }

    #[test]
    fn test_controls() {
        let options = controls(&staff());
        assert_eq!(options.text_columns, vec!["name", "department", "join_date"]);
        assert_eq!(options.departments, vec!["Eng", "Sales"]);
        assert_eq!(options.age_bounds, Some(Bounds { min: 25, max: 45 }));
        assert_eq!(options.sort_columns.len(), 5);
    }
}
