//! Domain models for the Tablesmith pipeline.
//!
//! This module contains the in-memory table every other module works on:
//!
//! - [`Cell`] - A single typed value
//! - [`ColumnType`] - Declared type of a column, inferred from its cells
//! - [`Column`] - A named, typed sequence of cells
//! - [`Table`] - Ordered columns with aligned rows

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

use crate::error::{TableError, TableResult};

// =============================================================================
// Cell
// =============================================================================

/// A single value in a table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// No value (empty field, `NA`, `null`, ...).
    Missing,
    /// Integer value.
    Int(i64),
    /// Floating point value. NaN counts as missing.
    Float(f64),
    /// Free text.
    Text(String),
    /// Calendar date with optional time of day.
    Date(NaiveDateTime),
}

impl Cell {
    /// Whether this cell holds no usable value.
    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Missing => true,
            Cell::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of numeric cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    /// Numeric view that also accepts numeric-looking text.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|f| !f.is_nan()),
            other => other.as_f64(),
        }
    }

    /// Whether this cell counts as numeric for type inference.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Cell::Int(_) | Cell::Float(_)) && !self.is_missing()
    }

    /// JSON representation used by the record export and the API.
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Missing => Value::Null,
            Cell::Int(i) => Value::from(*i),
            Cell::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Cell::Text(s) => Value::String(s.clone()),
            Cell::Date(_) => Value::String(self.to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Missing => Ok(()),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(v) => write!(f, "{}", format_float(*v)),
            Cell::Text(s) => f.write_str(s),
            Cell::Date(d) => {
                if d.time() == NaiveTime::MIN {
                    write!(f, "{}", d.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S"))
                }
            }
        }
    }
}

/// Render a float so that re-parsing yields the same value and integral
/// values stay recognisably floating point (`55000.0`).
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

// =============================================================================
// Column
// =============================================================================

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Number,
    Date,
    Mixed,
}

impl ColumnType {
    /// Infer the type from the non-missing cells.
    ///
    /// A column without any value is `Number`: it only holds missing values,
    /// which behave numerically.
    pub fn infer(cells: &[Cell]) -> Self {
        let mut seen: Option<ColumnType> = None;

        for cell in cells.iter().filter(|c| !c.is_missing()) {
            let kind = match cell {
                Cell::Int(_) | Cell::Float(_) => ColumnType::Number,
                Cell::Text(_) => ColumnType::Text,
                Cell::Date(_) => ColumnType::Date,
                Cell::Missing => continue,
            };
            match seen {
                None => seen = Some(kind),
                Some(prev) if prev != kind => return ColumnType::Mixed,
                _ => {}
            }
        }

        seen.unwrap_or(ColumnType::Number)
    }

    /// Text and mixed columns can be case-converted.
    pub fn is_textual(self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::Mixed)
    }
}

/// A named, typed sequence of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    dtype: ColumnType,
    cells: Vec<Cell>,
}

impl Column {
    /// Build a column, inferring its type.
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        let dtype = ColumnType::infer(&cells);
        Self {
            name: name.into(),
            dtype,
            cells,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> ColumnType {
        self.dtype
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Numeric values of the non-missing cells, in row order.
    pub fn numeric_values(&self) -> Vec<f64> {
        self.cells.iter().filter_map(Cell::as_f64).collect()
    }

    fn select(&self, indices: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            dtype: self.dtype,
            cells: indices.iter().map(|&i| self.cells[i].clone()).collect(),
        }
    }
}

// =============================================================================
// Table
// =============================================================================

/// Ordered columns with rows aligned by position.
///
/// Invariants: every column has the same length and column names are unique.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Build a table, checking the invariants.
    pub fn new(columns: Vec<Column>) -> TableResult<Self> {
        let mut table = Self::default();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    /// Append a new column. The name must be unused.
    pub fn push_column(&mut self, column: Column) -> TableResult<()> {
        if self.has_column(&column.name) {
            return Err(TableError::DuplicateColumn(column.name));
        }
        self.check_length(&column)?;
        self.columns.push(column);
        Ok(())
    }

    /// Replace the column with the same name in place, or append it.
    pub fn set_column(&mut self, column: Column) -> TableResult<()> {
        self.check_length(&column)?;
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(slot) => *slot = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    fn check_length(&self, column: &Column) -> TableResult<()> {
        if let Some(first) = self.columns.first() {
            // A lone column may be replaced by one of a different length.
            let replacing_only = self.columns.len() == 1 && first.name == column.name;
            if !replacing_only && first.len() != column.len() {
                return Err(TableError::LengthMismatch {
                    column: column.name.clone(),
                    expected: first.len(),
                    found: column.len(),
                });
            }
        }
        Ok(())
    }

    /// New table holding the rows at `indices`, in that order.
    ///
    /// Indices must be smaller than [`Table::row_count`].
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.select(indices)).collect(),
        }
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> Self {
        let indices: Vec<usize> = (0..n.min(self.row_count())).collect();
        self.take_rows(&indices)
    }

    /// Cells of row `index`, in column order.
    pub fn row(&self, index: usize) -> Vec<&Cell> {
        self.columns.iter().map(|c| &c.cells[index]).collect()
    }

    /// Iterate rows as cell vectors.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&Cell>> + '_ {
        (0..self.row_count()).map(move |i| self.row(i))
    }

    /// Names of the columns eligible for case conversion.
    pub fn text_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.dtype.is_textual())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Distinct non-missing values of a column, rendered, in order of first
    /// appearance. Empty when the column does not exist.
    pub fn distinct_values(&self, name: &str) -> Vec<String> {
        let Some(column) = self.column(name) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        column
            .cells
            .iter()
            .filter(|c| !c.is_missing())
            .map(|c| c.to_string())
            .filter(|v| seen.insert(v.clone()))
            .collect()
    }

    /// One JSON object per row, keys in column order.
    pub fn to_records(&self) -> Vec<Value> {
        self.rows()
            .map(|row| {
                let obj: Map<String, Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(col, cell)| (col.name.clone(), cell.to_json()))
                    .collect();
                Value::Object(obj)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn people() -> Table {
        Table::new(vec![
            Column::new("name", vec![text("Ann"), text("Bo"), text("Cy")]),
            Column::new("department", vec![text("Eng"), text("Eng"), text("Sales")]),
            Column::new("age", vec![Cell::Int(30), Cell::Int(45), Cell::Int(25)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_type_inference() {
        assert_eq!(ColumnType::infer(&[Cell::Int(1), Cell::Float(2.5)]), ColumnType::Number);
        assert_eq!(ColumnType::infer(&[text("a"), Cell::Missing]), ColumnType::Text);
        assert_eq!(ColumnType::infer(&[text("a"), Cell::Int(1)]), ColumnType::Mixed);
        assert_eq!(ColumnType::infer(&[Cell::Missing, Cell::Float(f64::NAN)]), ColumnType::Number);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = Table::new(vec![
            Column::new("a", vec![Cell::Int(1), Cell::Int(2)]),
            Column::new("b", vec![Cell::Int(1)]),
        ])
        .unwrap_err();
        assert!(matches!(err, TableError::LengthMismatch { expected: 2, found: 1, .. }));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = Table::new(vec![
            Column::new("a", vec![Cell::Int(1)]),
            Column::new("a", vec![Cell::Int(2)]),
        ])
        .unwrap_err();
        assert_eq!(err, TableError::DuplicateColumn("a".into()));
    }

    #[test]
    fn test_set_column_replaces_in_place() {
        let mut table = people();
        table
            .set_column(Column::new("name", vec![text("A"), text("B"), text("C")]))
            .unwrap();
        assert_eq!(table.column_names(), vec!["name", "department", "age"]);
        assert_eq!(table.row(1)[0], &text("B"));

        table
            .set_column(Column::new("extra", vec![Cell::Missing; 3]))
            .unwrap();
        assert_eq!(table.column_count(), 4);
    }

    #[test]
    fn test_take_rows_reorders() {
        let table = people().take_rows(&[2, 0]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.row(0)[0], &text("Cy"));
        assert_eq!(table.row(1)[0], &text("Ann"));
    }

    #[test]
    fn test_distinct_values_in_order() {
        let table = people();
        assert_eq!(table.distinct_values("department"), vec!["Eng", "Sales"]);
        assert!(table.distinct_values("missing").is_empty());
    }

    #[test]
    fn test_cell_rendering() {
        assert_eq!(Cell::Float(55000.0).to_string(), "55000.0");
        assert_eq!(Cell::Float(0.1 + 0.2).to_string(), "0.30000000000000004");
        assert_eq!(Cell::Int(-3).to_string(), "-3");
        assert_eq!(Cell::Missing.to_string(), "");

        let midnight = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(Cell::Date(midnight).to_string(), "2020-01-01");
        let noon = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(12, 30, 0).unwrap();
        assert_eq!(Cell::Date(noon).to_string(), "2020-01-01 12:30:00");
    }

    #[test]
    fn test_records_keep_column_order() {
        let records = people().to_records();
        assert_eq!(records.len(), 3);
        let keys: Vec<&String> = records[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["name", "department", "age"]);
        assert_eq!(records[0]["age"], 30);
    }
}
