use crate::error::{PipelineError, Result};
use csv::{ReaderBuilder, Trim};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// One raw row lifted out of an incoming file, before any cleaning.
/// Cells hold the original text; a missing cell is `None`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RawRow {
    /// 1-based line number in the source file, for reject reporting.
    pub line: u64,
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub admission_date: Option<String>,
}

pub trait RosterParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<RawRow>>;
}

impl std::fmt::Debug for dyn RosterParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RosterParser")
    }
}

/// Picks a parser for the given path, or refuses the file type.
/// Spreadsheet formats are recognized so the refusal names them precisely.
pub fn parser_for(path: &Path) -> Result<Box<dyn RosterParser>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => Ok(Box::new(CsvRosterParser)),
        "xlsx" | "xls" => Err(PipelineError::UnsupportedFileType(format!(
            "spreadsheet format '.{extension}' is not supported, convert to .csv"
        ))),
        "" => Err(PipelineError::UnsupportedFileType(format!(
            "no file extension: {}",
            path.display()
        ))),
        other => Err(PipelineError::UnsupportedFileType(format!(
            "unrecognized extension '.{other}'"
        ))),
    }
}

pub struct CsvRosterParser;

/// Canonical column slots, resolved from headers by loose matching.
#[derive(Debug, Default)]
struct ColumnMap {
    student_id: Option<usize>,
    student_name: Option<usize>,
    address: Option<usize>,
    phone: Option<usize>,
    admission_date: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let mut map = ColumnMap::default();
        for (idx, header) in headers.iter().enumerate() {
            match normalize_header(header).as_str() {
                "studentid" | "id" => map.student_id.get_or_insert(idx),
                "studentname" | "name" => map.student_name.get_or_insert(idx),
                "address" => map.address.get_or_insert(idx),
                "phone" | "phonenumber" | "phoneno" => map.phone.get_or_insert(idx),
                "admissiondate" | "dateofadmission" => map.admission_date.get_or_insert(idx),
                _ => continue,
            };
        }
        if map.student_id.is_none() {
            return Err(PipelineError::MissingColumn("StudentID".to_string()));
        }
        if map.student_name.is_none() {
            return Err(PipelineError::MissingColumn("StudentName".to_string()));
        }
        if map.admission_date.is_none() {
            return Err(PipelineError::MissingColumn("AdmissionDate".to_string()));
        }
        Ok(map)
    }
}

/// Lowercases and strips everything non-alphanumeric, so "Student_ID",
/// "student id" and a BOM-prefixed "StudentID" all resolve the same way.
fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn cell(record: &csv::StringRecord, idx: Option<usize>) -> Option<String> {
    let value = record.get(idx?)?;
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl RosterParser for CsvRosterParser {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<RawRow>> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(PipelineError::Transform(
                "file is empty (no header row)".to_string(),
            ));
        }
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(bytes);
        let columns = ColumnMap::from_headers(reader.headers()?)?;

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            let line = record
                .position()
                .map(|p| p.line())
                .unwrap_or(idx as u64 + 2);
            rows.push(RawRow {
                line,
                student_id: cell(&record, columns.student_id),
                student_name: cell(&record, columns.student_name),
                address: cell(&record, columns.address),
                phone: cell(&record, columns.phone),
                admission_date: cell(&record, columns.admission_date),
            });
        }
        debug!("CsvRosterParser: decoded {} data rows", rows.len());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_rows_with_canonical_headers() {
        let data = b"StudentID,StudentName,Address,Phone,AdmissionDate\n\
                     101,Alice Smith,12 Oak Ave,555-010-1234,2024-01-15\n\
                     102,Bob Jones,,,2024-02-01\n";
        let rows = CsvRosterParser.parse(data).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].student_id.as_deref(), Some("101"));
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[1].address, None);
        assert_eq!(rows[1].phone, None);
    }

    #[test]
    fn header_matching_is_loose() {
        let data = b"student_id,Student Name,ADDRESS,Phone Number,Date Of Admission\n\
                     7,Carol,9 Elm St,5550102222,2023-09-01\n";
        let rows = CsvRosterParser.parse(data).unwrap();
        assert_eq!(rows[0].student_id.as_deref(), Some("7"));
        assert_eq!(rows[0].student_name.as_deref(), Some("Carol"));
        assert_eq!(rows[0].phone.as_deref(), Some("5550102222"));
        assert_eq!(rows[0].admission_date.as_deref(), Some("2023-09-01"));
    }

    #[test]
    fn missing_required_column_is_refused() {
        let data = b"StudentName,Address\nAlice,12 Oak Ave\n";
        let err = CsvRosterParser.parse(data).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(c) if c == "StudentID"));
    }

    #[test]
    fn header_only_file_yields_zero_rows() {
        let data = b"StudentID,StudentName,Address,Phone,AdmissionDate\n";
        let rows = CsvRosterParser.parse(data).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn zero_byte_file_is_refused() {
        let err = CsvRosterParser.parse(b"").unwrap_err();
        assert!(matches!(err, PipelineError::Transform(_)));
    }

    #[test]
    fn ragged_rows_surface_missing_cells_as_none() {
        let data = b"StudentID,StudentName,Address,Phone,AdmissionDate\n\
                     103,Dana\n";
        let rows = CsvRosterParser.parse(data).unwrap();
        assert_eq!(rows[0].student_id.as_deref(), Some("103"));
        assert_eq!(rows[0].admission_date, None);
    }

    #[test]
    fn spreadsheet_extensions_are_named_in_refusal() {
        let err = parser_for(Path::new("incoming/roster.xlsx")).unwrap_err();
        match err {
            PipelineError::UnsupportedFileType(msg) => assert!(msg.contains("xlsx")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(parser_for(Path::new("incoming/roster.csv")).is_ok());
    }
}
