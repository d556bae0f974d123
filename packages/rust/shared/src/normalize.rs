//! Normalization helpers used by identity matching.
//!
//! Every match key the resolver evaluates is built from these functions, so
//! the storage layer and the resolver always agree on what "equal" means.

/// Case-fold a value for matching: trim whitespace, lowercase.
pub fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Strip a phone number down to its digits.
pub fn phone_digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// The last 10 digits of a phone number, used as the phone match key.
///
/// Returns `None` for numbers with fewer than 7 digits — matching on
/// near-empty strings produces false positives.
pub fn phone_suffix(s: &str) -> Option<String> {
    let digits = phone_digits(s);
    if digits.len() < 7 {
        return None;
    }
    let start = digits.len().saturating_sub(10);
    Some(digits[start..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_trims_and_lowercases() {
        assert_eq!(fold("  Jane Doe "), "jane doe");
        assert_eq!(fold("AUSTIN"), "austin");
        assert_eq!(fold(""), "");
    }

    #[test]
    fn phone_digits_strips_formatting() {
        assert_eq!(phone_digits("+1 (415) 555-0100"), "14155550100");
        assert_eq!(phone_digits("415.555.0100 ext 2"), "41555501002");
        assert_eq!(phone_digits("no digits"), "");
    }

    #[test]
    fn phone_suffix_takes_last_ten() {
        assert_eq!(
            phone_suffix("+1 (415) 555-0100").as_deref(),
            Some("4155550100")
        );
        assert_eq!(phone_suffix("415-555-0100").as_deref(), Some("4155550100"));
        assert_eq!(phone_suffix("14155550100").as_deref(), Some("4155550100"));
    }

    #[test]
    fn phone_suffix_rejects_short_numbers() {
        assert_eq!(phone_suffix("555-0100"), Some("5550100".into()));
        assert_eq!(phone_suffix("555123"), None);
        assert_eq!(phone_suffix(""), None);
        assert_eq!(phone_suffix("ext. 12"), None);
    }
}
