//! CSV loader with encoding detection and column type inference.
//!
//! Turns raw bytes into a [`Table`]. Numeric columns are recognised here;
//! everything else is kept as text. Dates are only parsed on demand by the
//! years-of-service step.

use csv::{ReaderBuilder, StringRecord};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{LoadError, LoadResult};
use crate::models::{Cell, Column, Table};

/// Field values read as missing.
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Options for loading a CSV file.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Field delimiter (default `,`).
    pub delimiter: char,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

impl LoadOptions {
    pub fn with_delimiter(delimiter: Option<char>) -> Self {
        delimiter.map(|delimiter| Self { delimiter }).unwrap_or_default()
    }
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Parsed table
    pub table: Table,
    /// Detected encoding
    pub encoding: String,
    /// Delimiter used
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> LoadResult<String> {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "utf-8-sig" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(enc) => {
                let (text, _, had_errors) = enc.decode(bytes);
                if had_errors {
                    return Err(LoadError::Encoding(format!("invalid {} sequence", other)));
                }
                text.into_owned()
            }
            // Unknown label: lossy UTF-8
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    };

    Ok(match decoded.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    })
}

/// Parse CSV bytes, detecting the encoding.
pub fn parse_bytes(bytes: &[u8], options: &LoadOptions) -> LoadResult<ParseResult> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let table = parse_str(&content, options.delimiter)?;

    Ok(ParseResult {
        table,
        encoding,
        delimiter: options.delimiter,
    })
}

/// Parse a CSV file from disk.
pub fn parse_file<P: AsRef<Path>>(path: P, options: &LoadOptions) -> LoadResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes(&bytes, options)
}

/// Parse CSV text with an explicit delimiter.
///
/// # Example
/// ```ignore
/// use tablesmith::parse_str;
///
/// let table = parse_str("name,age\nAlice,30\nBob,25", ',').unwrap();
///
/// assert_eq!(table.row_count(), 2);
/// assert_eq!(table.column_names(), vec!["name", "age"]);
/// ```
pub fn parse_str(content: &str, delimiter: char) -> LoadResult<Table> {
    let delimiter = u8::try_from(delimiter)
        .map_err(|_| LoadError::Malformed {
            line: 0,
            message: format!("delimiter '{}' is not a single byte", delimiter),
        })?;

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();

    let header = loop {
        match records.next() {
            None => return Err(LoadError::EmptyInput),
            Some(record) => {
                let record = record.map_err(malformed)?;
                if !is_blank(&record, content) {
                    break record;
                }
            }
        }
    };

    let headers = normalize_headers(&header);
    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];

    for record in records {
        let record = record.map_err(malformed)?;
        if is_blank(&record, content) {
            continue;
        }
        if record.len() > headers.len() {
            return Err(LoadError::FieldCount {
                line: record.position().map(|p| p.line()).unwrap_or(0),
                expected: headers.len(),
                found: record.len(),
            });
        }
        for (i, values) in raw.iter_mut().enumerate() {
            values.push(record.get(i).unwrap_or("").to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(raw)
        .map(|(name, values)| Column::new(name, infer_cells(values)))
        .collect();

    Ok(Table::new(columns)?)
}

fn malformed(err: csv::Error) -> LoadError {
    LoadError::Malformed {
        line: err.position().map(|p| p.line()).unwrap_or(0),
        message: err.to_string(),
    }
}

/// Whitespace-only lines. A lone quoted empty field (`""`) is a row with
/// one missing cell, not a blank line.
fn is_blank(record: &StringRecord, content: &str) -> bool {
    if record.len() > 1 || record.iter().any(|f| !f.trim().is_empty()) {
        return false;
    }
    let start = record.position().map(|p| p.byte() as usize).unwrap_or(0);
    // The position may sit before skipped empty lines
    let mut line = content
        .as_bytes()
        .get(start..)
        .unwrap_or_default()
        .iter()
        .skip_while(|&&b| b == b'\r' || b == b'\n')
        .take_while(|&&b| b != b'\n');
    line.find(|b| !b.is_ascii_whitespace()) != Some(&b'"')
}

/// Fill empty header names and make duplicates unique (`a`, `a.1`, `a.2`).
fn normalize_headers(record: &StringRecord) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut headers = Vec::with_capacity(record.len());

    for (i, raw) in record.iter().enumerate() {
        let base = if raw.trim().is_empty() {
            format!("Unnamed: {}", i)
        } else {
            raw.to_string()
        };

        let mut name = base.clone();
        let mut suffix = 1;
        while used.contains(&name) {
            name = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        used.insert(name.clone());
        headers.push(name);
    }

    headers
}

fn is_na(value: &str) -> bool {
    NA_VALUES.contains(&value)
}

/// Convert raw field values into cells of a single kind.
///
/// All integers → `Int`; all numbers → `Float`; otherwise the text as-is.
fn infer_cells(values: Vec<String>) -> Vec<Cell> {
    let present = || values.iter().filter(|v| !is_na(v));

    if present().all(|v| v.trim().parse::<i64>().is_ok()) {
        return values
            .iter()
            .map(|v| match v.trim().parse::<i64>() {
                Ok(i) if !is_na(v) => Cell::Int(i),
                _ => Cell::Missing,
            })
            .collect();
    }

    if present().all(|v| v.trim().parse::<f64>().is_ok()) {
        return values
            .iter()
            .map(|v| match v.trim().parse::<f64>() {
                Ok(f) if !is_na(v) => Cell::Float(f),
                _ => Cell::Missing,
            })
            .collect();
    }

    values
        .into_iter()
        .map(|v| if is_na(&v) { Cell::Missing } else { Cell::Text(v) })
        .collect()
}
