//! Pipeline steps.
//!
//! Each step works on the pipeline's working table and reports a
//! [`StepOutcome`]: either it ran (`Applied`, possibly changing nothing) or
//! its optional precondition was not met (`NotApplicable`) and the table was
//! left untouched. Only a malformed join date and an unknown sort column
//! abort a run.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{TransformError, TransformResult};
use crate::models::{Cell, Column, ColumnType, Table};

/// Source column of the bonus step.
pub const SALARY_COLUMN: &str = "salary";
/// Column added by the bonus step.
pub const BONUS_COLUMN: &str = "salary_with_bonus";
/// 10% uplift.
pub const BONUS_FACTOR: f64 = 1.1;
/// Source column of the years-of-service step.
pub const JOIN_DATE_COLUMN: &str = "join_date";
/// Column added by the years-of-service step.
pub const YEARS_OF_SERVICE_COLUMN: &str = "years_of_service";
/// Column matched by the department filter.
pub const DEPARTMENT_COLUMN: &str = "department";
/// Column bounded by the age filter.
pub const AGE_COLUMN: &str = "age";

const DAYS_PER_YEAR: f64 = 365.25;
const SECONDS_PER_DAY: i64 = 86_400;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

// =============================================================================
// Outcomes
// =============================================================================

/// Which step a report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    Uppercase,
    SalaryBonus,
    YearsOfService,
    DepartmentFilter,
    AgeFilter,
    Sort,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepKind::Uppercase => "uppercase",
            StepKind::SalaryBonus => "salary bonus",
            StepKind::YearsOfService => "years of service",
            StepKind::DepartmentFilter => "department filter",
            StepKind::AgeFilter => "age filter",
            StepKind::Sort => "sort",
        };
        f.write_str(label)
    }
}

/// What happened when an enabled step was run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum StepOutcome {
    /// The step ran.
    Applied { detail: String },
    /// The step's precondition was not met; the table is unchanged.
    NotApplicable { reason: String },
}

impl StepOutcome {
    fn applied(detail: impl Into<String>) -> Self {
        StepOutcome::Applied {
            detail: detail.into(),
        }
    }

    fn not_applicable(reason: impl Into<String>) -> Self {
        StepOutcome::NotApplicable {
            reason: reason.into(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, StepOutcome::Applied { .. })
    }
}

/// Outcome of one enabled step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub step: StepKind,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

// =============================================================================
// 1. Uppercase
// =============================================================================

/// Upper-case every cell of a text column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Uppercase {
    /// Target column; the first text column when unset.
    #[serde(default)]
    pub column: Option<String>,
}

impl Uppercase {
    pub fn on(column: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
        }
    }

    pub fn apply(&self, table: &mut Table) -> TransformResult<StepOutcome> {
        let text_columns = table.text_columns();
        let Some(first) = text_columns.first() else {
            return Ok(StepOutcome::not_applicable("no text columns"));
        };
        let name = self.column.clone().unwrap_or_else(|| first.clone());

        let cells: Vec<Cell> = match table.column(&name) {
            None => {
                return Ok(StepOutcome::not_applicable(format!(
                    "column '{}' not found",
                    name
                )))
            }
            Some(column) if !column.dtype().is_textual() => {
                return Ok(StepOutcome::not_applicable(format!(
                    "column '{}' is not a text column",
                    name
                )))
            }
            Some(column) => column.cells().iter().map(upper_cell).collect(),
        };

        table.set_column(Column::new(name.clone(), cells))?;
        Ok(StepOutcome::applied(format!("upper-cased '{}'", name)))
    }
}

fn upper_cell(cell: &Cell) -> Cell {
    match cell {
        c if c.is_missing() => Cell::Missing,
        Cell::Text(s) => Cell::Text(s.to_uppercase()),
        other => Cell::Text(other.to_string().to_uppercase()),
    }
}

// =============================================================================
// 2. Salary bonus
// =============================================================================

/// Append `salary_with_bonus = salary * 1.1`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SalaryBonus;

impl SalaryBonus {
    pub fn apply(&self, table: &mut Table) -> TransformResult<StepOutcome> {
        let Some(salary) = table.column(SALARY_COLUMN) else {
            return Ok(StepOutcome::not_applicable(format!(
                "no '{}' column",
                SALARY_COLUMN
            )));
        };

        let cells: Vec<Cell> = salary
            .cells()
            .iter()
            .map(|c| {
                c.to_number()
                    .map(|v| Cell::Float(v * BONUS_FACTOR))
                    .unwrap_or(Cell::Missing)
            })
            .collect();
        let unset = cells.iter().filter(|c| c.is_missing()).count();

        table.set_column(Column::new(BONUS_COLUMN, cells))?;

        let detail = if unset == 0 {
            format!("added '{}'", BONUS_COLUMN)
        } else {
            format!(
                "added '{}' ({} rows without a numeric salary)",
                BONUS_COLUMN, unset
            )
        };
        Ok(StepOutcome::applied(detail))
    }
}

// =============================================================================
// 3. Years of service
// =============================================================================

/// Parse `join_date` and append `years_of_service`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct YearsOfService;

impl YearsOfService {
    /// Any non-missing `join_date` that is not a date fails the whole step.
    pub fn apply(&self, table: &mut Table, now: NaiveDateTime) -> TransformResult<StepOutcome> {
        let Some(column) = table.column(JOIN_DATE_COLUMN) else {
            return Ok(StepOutcome::not_applicable(format!(
                "no '{}' column",
                JOIN_DATE_COLUMN
            )));
        };

        let mut dates = Vec::with_capacity(column.len());
        let mut years = Vec::with_capacity(column.len());

        for (row, cell) in column.cells().iter().enumerate() {
            let joined = match cell {
                c if c.is_missing() => None,
                Cell::Date(d) => Some(*d),
                Cell::Text(s) => Some(parse_date(s).ok_or_else(|| date_error(row, s))?),
                other => return Err(date_error(row, &other.to_string())),
            };

            match joined {
                Some(d) => {
                    dates.push(Cell::Date(d));
                    years.push(Cell::Float(years_between(d, now)));
                }
                None => {
                    dates.push(Cell::Missing);
                    years.push(Cell::Missing);
                }
            }
        }

        table.set_column(Column::new(JOIN_DATE_COLUMN, dates))?;
        table.set_column(Column::new(YEARS_OF_SERVICE_COLUMN, years))?;

        Ok(StepOutcome::applied(format!(
            "added '{}' as of {}",
            YEARS_OF_SERVICE_COLUMN,
            now.format("%Y-%m-%d %H:%M")
        )))
    }
}

fn date_error(row: usize, value: &str) -> TransformError {
    TransformError::DateParse {
        column: JOIN_DATE_COLUMN.to_string(),
        row,
        value: value.to_string(),
    }
}

/// Whole elapsed days divided by 365.25, rounded to one decimal.
pub fn years_between(from: NaiveDateTime, now: NaiveDateTime) -> f64 {
    let days = (now - from).num_seconds().div_euclid(SECONDS_PER_DAY);
    let years = days as f64 / DAYS_PER_YEAR;
    (years * 10.0).round() / 10.0
}

/// Parse the calendar date formats accepted for `join_date`.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

// =============================================================================
// 4. Department filter
// =============================================================================

/// Keep the rows whose `department` equals one value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentFilter {
    /// Selected department; the first distinct value when unset.
    #[serde(default)]
    pub value: Option<String>,
}

impl DepartmentFilter {
    pub fn equals(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
        }
    }

    pub fn apply(&self, table: &mut Table) -> TransformResult<StepOutcome> {
        let Some(column) = table.column(DEPARTMENT_COLUMN) else {
            return Ok(StepOutcome::not_applicable(format!(
                "no '{}' column",
                DEPARTMENT_COLUMN
            )));
        };

        let value = match &self.value {
            Some(v) => v.clone(),
            None => match table.distinct_values(DEPARTMENT_COLUMN).into_iter().next() {
                Some(v) => v,
                None => return Ok(StepOutcome::not_applicable("no department values")),
            },
        };

        let keep: Vec<usize> = column
            .cells()
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_missing() && c.to_string() == value)
            .map(|(i, _)| i)
            .collect();

        let before = table.row_count();
        *table = table.take_rows(&keep);

        Ok(StepOutcome::applied(format!(
            "department = '{}' kept {} of {} rows",
            value,
            keep.len(),
            before
        )))
    }
}

// =============================================================================
// 5. Age filter
// =============================================================================

/// Keep the rows whose `age` lies in an inclusive integer range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeFilter {
    /// Lower bound; the observed minimum when unset.
    #[serde(default)]
    pub lower: Option<i64>,
    /// Upper bound; the observed maximum when unset.
    #[serde(default)]
    pub upper: Option<i64>,
}

/// Observed integer range of a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bounds {
    pub min: i64,
    pub max: i64,
}

impl AgeFilter {
    pub fn between(lower: i64, upper: i64) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    /// Truncated min/max of `age`, if it is a numeric column with values.
    pub fn observed_bounds(table: &Table) -> Option<Bounds> {
        let column = table.column(AGE_COLUMN)?;
        if column.dtype() != ColumnType::Number {
            return None;
        }
        let values = column.numeric_values();
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Bounds {
            min: min.trunc() as i64,
            max: max.trunc() as i64,
        })
    }

    pub fn apply(&self, table: &mut Table) -> TransformResult<StepOutcome> {
        let Some(column) = table.column(AGE_COLUMN) else {
            return Ok(StepOutcome::not_applicable(format!(
                "no '{}' column",
                AGE_COLUMN
            )));
        };
        let Some(bounds) = Self::observed_bounds(table) else {
            return Ok(StepOutcome::not_applicable(format!(
                "'{}' has no numeric values",
                AGE_COLUMN
            )));
        };

        let lower = self.lower.unwrap_or(bounds.min) as f64;
        let upper = self.upper.unwrap_or(bounds.max) as f64;

        let keep: Vec<usize> = column
            .cells()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.as_f64().is_some_and(|v| v >= lower && v <= upper))
            .map(|(i, _)| i)
            .collect();

        let before = table.row_count();
        *table = table.take_rows(&keep);

        Ok(StepOutcome::applied(format!(
            "age in [{}, {}] kept {} of {} rows",
            lower,
            upper,
            keep.len(),
            before
        )))
    }
}

// =============================================================================
// 6. Sort
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Stable sort by one column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sort {
    /// Sort key; the first column when unset.
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub order: SortOrder,
}

impl Sort {
    pub fn by(column: impl Into<String>, order: SortOrder) -> Self {
        Self {
            column: Some(column.into()),
            order,
        }
    }

    /// Missing values go last in both directions; equal keys keep their
    /// input order.
    pub fn apply(&self, table: &mut Table) -> TransformResult<StepOutcome> {
        let name = match self.column.clone().or_else(|| table.column_names().into_iter().next()) {
            Some(name) => name,
            None => return Ok(StepOutcome::not_applicable("table has no columns")),
        };
        let column = table
            .column(&name)
            .ok_or_else(|| TransformError::MissingColumn(name.clone()))?;

        let cells = column.cells();
        let mut order: Vec<usize> = (0..cells.len()).collect();
        order.sort_by(|&i, &j| {
            let (a, b) = (&cells[i], &cells[j]);
            match (a.is_missing(), b.is_missing()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ord = compare_cells(a, b);
                    match self.order {
                        SortOrder::Ascending => ord,
                        SortOrder::Descending => ord.reverse(),
                    }
                }
            }
        });

        *table = table.take_rows(&order);

        let direction = match self.order {
            SortOrder::Ascending => "ascending",
            SortOrder::Descending => "descending",
        };
        Ok(StepOutcome::applied(format!("sorted by '{}' {}", name, direction)))
    }
}

/// Total order over non-missing cells: numbers < dates < text.
fn compare_cells(a: &Cell, b: &Cell) -> Ordering {
    match (a, b) {
        (Cell::Int(x), Cell::Int(y)) => x.cmp(y),
        (Cell::Text(x), Cell::Text(y)) => x.cmp(y),
        (Cell::Date(x), Cell::Date(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => kind_rank(a).cmp(&kind_rank(b)),
        },
    }
}

fn kind_rank(cell: &Cell) -> u8 {
    match cell {
        Cell::Int(_) | Cell::Float(_) => 0,
        Cell::Date(_) => 1,
        Cell::Text(_) => 2,
        Cell::Missing => 3,
    }
}
