//! Comma-separated export.
//!
//! Header row, then one line per row. Numbers keep their full precision,
//! dates are written as ISO strings and missing cells as empty fields.

use csv::{Terminator, WriterBuilder};

use crate::error::{ExportError, ExportResult};
use crate::models::Table;

pub fn to_csv(table: &Table) -> ExportResult<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    if table.column_count() > 0 {
        writer.write_record(table.columns().iter().map(|c| c.name()))?;
    }

    for row in table.rows() {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))
}
