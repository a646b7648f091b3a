use once_cell::sync::Lazy;
use regex::Regex;

static NON_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D").unwrap());

/// Result of canonicalizing a phone field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhoneOutcome {
    /// No digits at all. Phone is an optional field, so this stays empty.
    Empty,
    /// The canonical ten-digit national form.
    Canonical(String),
    /// Some digits, but fewer than ten after canonicalization.
    TooShort(String),
}

/// Canonicalizes a phone number to its last ten digits.
///
/// Spreadsheet exports sometimes render large numbers in scientific notation
/// ("9.87654321E9"); those are expanded to plain digits first. Longer inputs
/// such as "+1 555 010 1234" keep only the trailing ten digits.
pub fn clean_phone(raw: &str) -> PhoneOutcome {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return PhoneOutcome::Empty;
    }
    let expanded = if trimmed.contains(['e', 'E']) {
        expand_scientific(trimmed).unwrap_or_else(|| trimmed.to_string())
    } else {
        trimmed.to_string()
    };
    let digits = NON_DIGIT.replace_all(&expanded, "").to_string();
    if digits.is_empty() {
        PhoneOutcome::Empty
    } else if digits.len() >= 10 {
        PhoneOutcome::Canonical(digits[digits.len() - 10..].to_string())
    } else {
        PhoneOutcome::TooShort(digits)
    }
}

fn expand_scientific(raw: &str) -> Option<String> {
    let value: f64 = raw.parse().ok()?;
    // Stay inside i64 so the integer cast cannot wrap.
    if !value.is_finite() || value < 0.0 || value > 9.2e18 {
        return None;
    }
    Some((value.trunc() as i64).to_string())
}
