use once_cell::sync::Lazy;
use regex::Regex;

static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9\s,.-]").unwrap());
static EXTRA_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Canonicalizes a free-text field.
///
/// Blank input and the literal string "null" (any case) become empty.
/// Underscores turn into spaces before the character filter runs, everything
/// outside `[a-zA-Z0-9\s,.-]` is dropped, and whitespace runs collapse to a
/// single space.
pub fn clean_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return String::new();
    }
    let spaced = trimmed.replace('_', " ");
    let stripped = DISALLOWED.replace_all(&spaced, "");
    let collapsed = EXTRA_WHITESPACE.replace_all(&stripped, " ");
    collapsed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_special_characters() {
        assert_eq!(clean_text("John@Smith!!"), "JohnSmith");
        assert_eq!(clean_text("O'Brien, Jr."), "OBrien, Jr.");
        assert_eq!(clean_text("#42 $Main %St^"), "42 Main St");
    }

    #[test]
    fn underscores_become_spaces_before_filtering() {
        assert_eq!(clean_text("12_Oak_Ave"), "12 Oak Ave");
        assert_eq!(clean_text("APT_4B"), "APT 4B");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(clean_text("  Mary   Jane\tDoe  "), "Mary Jane Doe");
    }

    #[test]
    fn null_markers_become_empty() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("   "), "");
        assert_eq!(clean_text("NULL"), "");
        assert_eq!(clean_text("null"), "");
        assert_eq!(clean_text(" Null "), "");
    }

    #[test]
    fn keeps_allowed_punctuation() {
        assert_eq!(clean_text("12 Oak Ave, Apt 4.5-B"), "12 Oak Ave, Apt 4.5-B");
    }

    #[test]
    fn drops_non_ascii() {
        assert_eq!(clean_text("Café"), "Caf");
    }
}
