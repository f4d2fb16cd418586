//! Export encoder.
//!
//! Serializes a table into one of three self-contained payloads. Each
//! encoder only reads the table it is given, so payloads are independent of
//! each other and of the order they are generated in.
//!
//! | Format | File name | Media type |
//! |--------|-----------|------------|
//! | CSV    | `transformed_file.csv`  | `text/csv` |
//! | XLSX   | `transformed_file.xlsx` | `application/vnd.openxmlformats-officedocument.spreadsheetml.sheet` |
//! | JSON   | `transformed_file.json` | `application/json` |

pub mod delimited;
pub mod records;
pub mod spreadsheet;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::api::logs::log_success;
use crate::error::{ExportError, ExportResult};
use crate::models::Table;

/// Default file name stem for exported payloads.
pub const DEFAULT_BASENAME: &str = "transformed_file";

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Json,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [ExportFormat::Csv, ExportFormat::Xlsx, ExportFormat::Json];

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Json => "json",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Json => "application/json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            "json" => Ok(ExportFormat::Json),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

/// One downloadable artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPayload {
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub media_type: &'static str,
}

/// Encode a table with the default file name.
pub fn export(table: &Table, format: ExportFormat) -> ExportResult<ExportPayload> {
    export_named(table, format, DEFAULT_BASENAME)
}

/// Encode a table, naming the file `<basename>.<extension>`.
pub fn export_named(
    table: &Table,
    format: ExportFormat,
    basename: &str,
) -> ExportResult<ExportPayload> {
    let bytes = match format {
        ExportFormat::Csv => delimited::to_csv(table)?,
        ExportFormat::Xlsx => spreadsheet::to_xlsx(table)?,
        ExportFormat::Json => records::to_json(table)?,
    };

    let payload = ExportPayload {
        format,
        file_name: format!("{}.{}", basename, format.extension()),
        media_type: format.media_type(),
        bytes,
    };
    log_success(format!(
        "Encoded {} ({} bytes)",
        payload.file_name,
        payload.bytes.len()
    ));
    Ok(payload)
}

/// Encode a table in every format.
pub fn export_all(table: &Table, basename: &str) -> ExportResult<Vec<ExportPayload>> {
    ExportFormat::ALL
        .iter()
        .map(|&format| export_named(table, format, basename))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;

    #[test]
    fn test_payload_metadata() {
        let table = parse_str("a\n1\n", ',').unwrap();

        let csv = export(&table, ExportFormat::Csv).unwrap();
        assert_eq!(csv.file_name, "transformed_file.csv");
        assert_eq!(csv.media_type, "text/csv");

        let xlsx = export(&table, ExportFormat::Xlsx).unwrap();
        assert_eq!(xlsx.file_name, "transformed_file.xlsx");
        assert_eq!(
            xlsx.media_type,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );

        let json = export(&table, ExportFormat::Json).unwrap();
        assert_eq!(json.file_name, "transformed_file.json");
        assert_eq!(json.media_type, "application/json");
    }

    #[test]
    fn test_export_order_independent() {
        let table = parse_str("name,age\nAnn,30\nBo,45\n", ',').unwrap();

        let forward = export_all(&table, "out").unwrap();
        let json_first = export(&table, ExportFormat::Json).unwrap();
        let csv_last = export(&table, ExportFormat::Csv).unwrap();

        assert_eq!(forward[2].bytes, json_first.bytes);
        assert_eq!(forward[0].bytes, csv_last.bytes);
        assert_eq!(forward[0].file_name, "out.csv");
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("excel".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!(matches!(
            "parquet".parse::<ExportFormat>(),
            Err(ExportError::UnknownFormat(_))
        ));
    }
}
