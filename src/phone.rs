//! Phone number normalization to E.164.
//!
//! Every phone number crossing a boundary (inbound webhook, outbound send,
//! lead lookup, integration config matching) goes through [`normalize`]
//! first. Two numbers match iff their normalized forms are equal.

/// Normalize a phone number to E.164.
///
/// Rules:
/// - strip every non-digit character
/// - 10 digits: assume US/Canada, prefix `+1`
/// - 11 digits starting with `1`: prefix `+`
/// - anything else: prefix `+` and keep the digits as-is
///
/// Returns `None` when the input contains no digits at all.
pub fn normalize(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let normalized = if digits.len() == 10 {
        format!("+1{digits}")
    } else if digits.len() == 11 && digits.starts_with('1') {
        format!("+{digits}")
    } else {
        format!("+{digits}")
    };
    Some(normalized)
}

/// Check whether two raw phone numbers refer to the same line.
pub fn matches(a: &str, b: &str) -> bool {
    match (normalize(a), normalize(b)) {
        (Some(na), Some(nb)) => na == nb,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_digits_get_us_country_code() {
        assert_eq!(normalize("5551234567").as_deref(), Some("+15551234567"));
        assert_eq!(normalize("(555) 123-4567").as_deref(), Some("+15551234567"));
    }

    #[test]
    fn eleven_digits_with_leading_one() {
        assert_eq!(normalize("15551234567").as_deref(), Some("+15551234567"));
        assert_eq!(normalize("+1 555 123 4567").as_deref(), Some("+15551234567"));
    }

    #[test]
    fn other_lengths_keep_digits() {
        assert_eq!(normalize("+44 20 7946 0958").as_deref(), Some("+442079460958"));
    }

    #[test]
    fn no_digits_is_none() {
        assert_eq!(normalize("not a number"), None);
        assert_eq!(normalize(""), None);
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["5551234567", "15551234567", "+442079460958", "555-123-4567"] {
            let once = normalize(raw).expect("normalizes");
            let twice = normalize(&once).expect("normalizes");
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn matching_ignores_formatting() {
        assert!(matches("(555) 123-4567", "+15551234567"));
        assert!(!matches("5551234567", "5559876543"));
    }
}
