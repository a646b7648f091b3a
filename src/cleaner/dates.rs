use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

/// Date-only layouts tried in order. First match wins, so ISO dates and US
/// month-first forms take precedence over day-first forms.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%m/%d/%y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%Y%m%d",
];

/// Timestamp layouts whose date part is taken when date-only parsing fails.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Parses a date field into a canonical calendar date, or `None` when no
/// supported layout matches.
pub fn clean_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            // chrono's %Y accepts bare two-digit years; skip those so inputs
            // like "1/5/24" fall through to the %y layout instead of year 24.
            if date.year() >= 1000 {
                return Some(date);
            }
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            if dt.year() >= 1000 {
                return Some(dt.date());
            }
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }
    None
}
