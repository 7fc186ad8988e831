//! Fiche number format (`F24-0153`).

use once_cell::sync::Lazy;
use regex::Regex;

static FICHE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^F\d{2}-\d{4}$").expect("static fiche number pattern"));

/// Check the fiche number format. Empty is accepted: the number is only
/// mandatory when validating a visit.
pub fn is_valid_fiche_number(value: &str) -> bool {
    value.is_empty() || FICHE_NUMBER_RE.is_match(value)
}

/// Normalize desk input such as `f1-23` into `F01-0023`.
///
/// Input that does not reduce to two numeric groups is returned unchanged and
/// left for [`is_valid_fiche_number`] to reject.
pub fn format_fiche_number(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();

    let mut groups = cleaned.split('-');
    match (groups.next(), groups.next(), groups.next()) {
        (Some(series), Some(sequence), None) if !series.is_empty() && !sequence.is_empty() => {
            format!("F{:0>2}-{:0>4}", series, sequence)
        }
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_valid() {
        assert!(is_valid_fiche_number(""));
    }

    #[test]
    fn test_format_check() {
        assert!(is_valid_fiche_number("F24-0153"));
        assert!(is_valid_fiche_number("f24-0153"));
        assert!(!is_valid_fiche_number("F2-0153"));
        assert!(!is_valid_fiche_number("F24-153"));
        assert!(!is_valid_fiche_number("24-0153"));
        assert!(!is_valid_fiche_number("abc"));
    }

    #[test]
    fn test_format_pads_groups() {
        assert_eq!(format_fiche_number("f1-23"), "F01-0023");
        assert_eq!(format_fiche_number("F24-0153"), "F24-0153");
        assert_eq!(format_fiche_number(" 7 - 5 "), "F07-0005");
    }

    #[test]
    fn test_format_leaves_unusable_input() {
        assert_eq!(format_fiche_number("abc"), "abc");
        assert!(!is_valid_fiche_number(&format_fiche_number("abc")));

        assert_eq!(format_fiche_number("1-2-3"), "1-2-3");
        assert_eq!(format_fiche_number("12"), "12");
        assert_eq!(format_fiche_number("-12"), "-12");
    }

    #[test]
    fn test_format_does_not_truncate() {
        let formatted = format_fiche_number("123-45678");
        assert_eq!(formatted, "F123-45678");
        assert!(!is_valid_fiche_number(&formatted));
    }
}
