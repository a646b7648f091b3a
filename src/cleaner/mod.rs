pub mod dates;
pub mod phone;
pub mod text;

use crate::domain::CleanRecord;
use crate::error::{PipelineError, Result};
use crate::parser::RawRow;
use phone::PhoneOutcome;
use serde::Serialize;
use tracing::debug;

/// Why a row was rejected during cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    /// StudentID is missing or not an integer.
    InvalidStudentId,
    /// Phone has digits but cannot be canonicalized to ten.
    InvalidPhone,
    /// AdmissionDate is missing or matches no supported layout.
    InvalidAdmissionDate,
}

impl RejectReason {
    pub fn field(&self) -> &'static str {
        match self {
            RejectReason::InvalidStudentId => "StudentID",
            RejectReason::InvalidPhone => "Phone",
            RejectReason::InvalidAdmissionDate => "AdmissionDate",
        }
    }
}

/// A rejected row with enough context to find it in the source file.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRow {
    pub line: u64,
    pub reason: RejectReason,
    pub detail: String,
}

/// Outcome of cleaning one file: the rows to load plus the reject tally.
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub records: Vec<CleanRecord>,
    pub rejected: Vec<RejectedRow>,
}

impl CleanReport {
    pub fn total_rows(&self) -> usize {
        self.records.len() + self.rejected.len()
    }

    pub fn reject_ratio(&self) -> f64 {
        if self.total_rows() == 0 {
            0.0
        } else {
            self.rejected.len() as f64 / self.total_rows() as f64
        }
    }
}

/// Configuration for the cleaning policy.
#[derive(Debug, Clone)]
pub struct CleanerConfig {
    /// Fraction of rows that may be rejected before the file as a whole fails.
    pub max_reject_ratio: f64,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            max_reject_ratio: 0.5,
        }
    }
}

/// Deterministic row cleaner. The same input rows always produce the same
/// records and the same reject tally.
pub struct Cleaner {
    pub config: CleanerConfig,
}

impl Cleaner {
    pub fn new() -> Self {
        Self {
            config: CleanerConfig::default(),
        }
    }

    pub fn with_config(config: CleanerConfig) -> Self {
        Self { config }
    }

    /// Cleans every row, keeping valid rows and tallying rejects. Row-level
    /// problems never abort the batch here; `enforce_policy` decides whether
    /// the tally sinks the whole file.
    pub fn clean_batch(&self, rows: &[RawRow]) -> CleanReport {
        let mut records = Vec::new();
        let mut rejected = Vec::new();
        for row in rows {
            match self.clean_row(row) {
                Ok(record) => records.push(record),
                Err(reject) => {
                    debug!(
                        line = reject.line,
                        field = reject.reason.field(),
                        detail = %reject.detail,
                        "row rejected"
                    );
                    rejected.push(reject);
                }
            }
        }
        CleanReport { records, rejected }
    }

    /// Fails the file when the reject tally exceeds the configured ratio.
    pub fn enforce_policy(&self, report: &CleanReport) -> Result<()> {
        let ratio = report.reject_ratio();
        if ratio > self.config.max_reject_ratio {
            return Err(PipelineError::Transform(format!(
                "too many rejected rows: {} of {} ({:.0}%), limit {:.0}%",
                report.rejected.len(),
                report.total_rows(),
                ratio * 100.0,
                self.config.max_reject_ratio * 100.0
            )));
        }
        Ok(())
    }

    fn clean_row(&self, row: &RawRow) -> std::result::Result<CleanRecord, RejectedRow> {
        let student_id = match row.student_id.as_deref().and_then(parse_student_id) {
            Some(id) => id,
            None => {
                return Err(RejectedRow {
                    line: row.line,
                    reason: RejectReason::InvalidStudentId,
                    detail: format!(
                        "StudentID '{}' is not an integer",
                        row.student_id.as_deref().unwrap_or("")
                    ),
                })
            }
        };

        let student_name = text::clean_text(row.student_name.as_deref().unwrap_or(""));
        let address = text::clean_text(row.address.as_deref().unwrap_or(""));

        let phone = match phone::clean_phone(row.phone.as_deref().unwrap_or("")) {
            PhoneOutcome::Empty => String::new(),
            PhoneOutcome::Canonical(digits) => digits,
            PhoneOutcome::TooShort(digits) => {
                return Err(RejectedRow {
                    line: row.line,
                    reason: RejectReason::InvalidPhone,
                    detail: format!(
                        "phone has {} digits after cleaning, need ten",
                        digits.len()
                    ),
                })
            }
        };

        let admission_date = match row
            .admission_date
            .as_deref()
            .and_then(dates::clean_date)
        {
            Some(date) => date,
            None => {
                return Err(RejectedRow {
                    line: row.line,
                    reason: RejectReason::InvalidAdmissionDate,
                    detail: format!(
                        "unparseable admission date '{}'",
                        row.admission_date.as_deref().unwrap_or("")
                    ),
                })
            }
        };

        Ok(CleanRecord {
            student_id,
            student_name,
            address,
            phone,
            admission_date,
        })
    }
}

impl Default for Cleaner {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts plain integers plus spreadsheet float renderings like "101.0".
fn parse_student_id(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(id) = trimmed.parse::<i64>() {
        return Some(id);
    }
    let value: f64 = trimmed.parse().ok()?;
    if !value.is_finite() || value.fract() != 0.0 || value.abs() > 9.2e18 {
        return None;
    }
    Some(value as i64)
}
