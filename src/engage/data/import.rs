//! CSV and spreadsheet parsing for dataset imports.
//!
//! Each data row becomes a JSON object keyed by the header row. Rows are
//! numbered from 1, counting data rows only.

use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Only CSV and Excel files are allowed")]
    UnsupportedFormat,
    #[error("Spreadsheet import is not enabled in this build")]
    SpreadsheetsDisabled,
    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to read spreadsheet: {0}")]
    Spreadsheet(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Spreadsheet,
}

impl FileFormat {
    pub fn from_filename(filename: &str) -> Result<Self, ImportError> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .ok_or(ImportError::UnsupportedFormat)?;
        match extension.as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "xls" => Ok(Self::Spreadsheet),
            _ => Err(ImportError::UnsupportedFormat),
        }
    }
}

/// One parsed data row; `data` is `Err` when the row itself was malformed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub row: usize,
    pub data: Result<Value, String>,
}

pub fn parse_file(filename: &str, bytes: &[u8]) -> Result<Vec<ParsedRow>, ImportError> {
    match FileFormat::from_filename(filename)? {
        FileFormat::Csv => parse_csv(bytes),
        FileFormat::Spreadsheet => parse_spreadsheet(bytes),
    }
}

fn column_key(index: usize, header: &str) -> String {
    let header = header.trim();
    if header.is_empty() {
        format!("column_{}", index + 1)
    } else {
        header.to_string()
    }
}

pub fn parse_csv(bytes: &[u8]) -> Result<Vec<ParsedRow>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| column_key(i, h.trim_start_matches('\u{feff}')))
        .collect();

    let rows = reader
        .records()
        .enumerate()
        .map(|(i, record)| {
            let data = record
                .map(|record| {
                    let object: Map<String, Value> = record
                        .iter()
                        .enumerate()
                        .map(|(col, value)| {
                            let key = headers
                                .get(col)
                                .cloned()
                                .unwrap_or_else(|| column_key(col, ""));
                            (key, Value::String(value.to_string()))
                        })
                        .collect();
                    Value::Object(object)
                })
                .map_err(|e| e.to_string());
            ParsedRow { row: i + 1, data }
        })
        .collect();

    Ok(rows)
}

#[cfg(feature = "import")]
pub fn parse_spreadsheet(bytes: &[u8]) -> Result<Vec<ParsedRow>, ImportError> {
    use calamine::{open_workbook_auto_from_rs, Data, Reader};
    use std::io::Cursor;

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ImportError::Spreadsheet(e.to_string()))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| ImportError::Spreadsheet(e.to_string()))?,
        None => return Ok(Vec::new()),
    };

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .enumerate()
            .map(|(i, cell)| column_key(i, &cell.to_string()))
            .collect(),
        None => return Ok(Vec::new()),
    };

    let cell_value = |cell: &Data| -> Option<Value> {
        match cell {
            Data::Empty => None,
            Data::String(s) if s.trim().is_empty() => None,
            Data::String(s) => Some(Value::String(s.clone())),
            Data::Int(i) => Some(Value::from(*i)),
            Data::Float(f) => Some(
                serde_json::Number::from_f64(*f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            ),
            Data::Bool(b) => Some(Value::Bool(*b)),
            other => Some(Value::String(other.to_string())),
        }
    };

    let parsed = rows
        .filter_map(|cells| {
            let object: Map<String, Value> = cells
                .iter()
                .enumerate()
                .filter_map(|(col, cell)| {
                    let key = headers
                        .get(col)
                        .cloned()
                        .unwrap_or_else(|| column_key(col, ""));
                    cell_value(cell).map(|value| (key, value))
                })
                .collect();
            (!object.is_empty()).then_some(Value::Object(object))
        })
        .enumerate()
        .map(|(i, value)| ParsedRow {
            row: i + 1,
            data: Ok(value),
        })
        .collect();

    Ok(parsed)
}

#[cfg(not(feature = "import"))]
pub fn parse_spreadsheet(_bytes: &[u8]) -> Result<Vec<ParsedRow>, ImportError> {
    Err(ImportError::SpreadsheetsDisabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_from_filename() {
        assert_eq!(FileFormat::from_filename("leads.CSV").unwrap(), FileFormat::Csv);
        assert_eq!(
            FileFormat::from_filename("report.final.xlsx").unwrap(),
            FileFormat::Spreadsheet
        );
        assert_eq!(FileFormat::from_filename("old.xls").unwrap(), FileFormat::Spreadsheet);
        assert!(matches!(
            FileFormat::from_filename("notes.txt"),
            Err(ImportError::UnsupportedFormat)
        ));
        assert!(matches!(
            FileFormat::from_filename("README"),
            Err(ImportError::UnsupportedFormat)
        ));
    }

    #[test]
    fn test_csv_rows_keyed_by_header() {
        let rows = parse_csv(b"name,email\nAda,ada@example.com\nAlan , alan@example.com\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row, 1);
        assert_eq!(
            rows[0].data,
            Ok(json!({"name": "Ada", "email": "ada@example.com"}))
        );
        assert_eq!(
            rows[1].data,
            Ok(json!({"name": "Alan", "email": "alan@example.com"}))
        );
    }

    #[test]
    fn test_csv_header_only_has_no_rows() {
        assert!(parse_csv(b"name,email\n").unwrap().is_empty());
        assert!(parse_csv(b"").unwrap().is_empty());
    }

    #[test]
    fn test_csv_extra_and_blank_columns() {
        let rows = parse_csv(b"name,\nAda,x,y\n").unwrap();
        assert_eq!(
            rows[0].data,
            Ok(json!({"name": "Ada", "column_2": "x", "column_3": "y"}))
        );
    }

    #[test]
    fn test_csv_byte_order_mark_is_stripped() {
        let rows = parse_csv("\u{feff}name\nAda\n".as_bytes()).unwrap();
        assert_eq!(rows[0].data, Ok(json!({"name": "Ada"})));
    }

    #[cfg(feature = "import")]
    #[test]
    fn test_garbage_spreadsheet_is_an_error() {
        assert!(matches!(
            parse_file("broken.xlsx", b"not a zip archive"),
            Err(ImportError::Spreadsheet(_))
        ));
    }
}
