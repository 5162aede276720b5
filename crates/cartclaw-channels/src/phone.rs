//! Phone normalization to E.164.
//!
//! Rules:
//! - A leading `+` wins: everything else is stripped to digits.
//! - A `00` international prefix becomes `+`.
//! - Otherwise the number is treated as local: trunk zeros are dropped and
//!   the country's dial code is prepended.
//! Returns `None` when the number cannot be formatted.

/// Country dial codes for the markets CartClaw ships to.
const DIAL_CODES: &[(&str, &str)] = &[
    ("AU", "61"),
    ("NZ", "64"),
    ("GB", "44"),
    ("IE", "353"),
    ("US", "1"),
    ("CA", "1"),
    ("DE", "49"),
    ("FR", "33"),
    ("ES", "34"),
    ("IT", "39"),
    ("NL", "31"),
    ("BE", "32"),
    ("SE", "46"),
    ("NO", "47"),
    ("DK", "45"),
    ("FI", "358"),
    ("CH", "41"),
    ("AT", "43"),
    ("PT", "351"),
    ("PL", "48"),
    ("SG", "65"),
    ("HK", "852"),
    ("JP", "81"),
    ("KR", "82"),
    ("IN", "91"),
    ("ID", "62"),
    ("MY", "60"),
    ("TH", "66"),
    ("VN", "84"),
    ("PH", "63"),
    ("BR", "55"),
    ("MX", "52"),
    ("ZA", "27"),
    ("AE", "971"),
];

fn dial_code(country: &str) -> Option<&'static str> {
    let country = country.to_ascii_uppercase();
    DIAL_CODES
        .iter()
        .find(|(cc, _)| *cc == country)
        .map(|(_, code)| *code)
}

fn digits_of(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Convert a raw phone number to E.164 (`+61412345678`) using `country`
/// (two-letter code) for local numbers.
pub fn to_e164(raw: &str, country: &str) -> Option<String> {
    let phone = raw.trim();
    if phone.is_empty() {
        return None;
    }

    if phone.starts_with('+') {
        let digits = digits_of(phone);
        if digits.is_empty() {
            return None;
        }
        return Some(format!("+{digits}"));
    }

    let digits = digits_of(phone);
    if digits.is_empty() {
        return None;
    }

    // "00" international prefix.
    if let Some(rest) = digits.strip_prefix("00") {
        if rest.is_empty() {
            return None;
        }
        return Some(format!("+{rest}"));
    }

    // Local number: drop trunk zeros, prepend the dial code.
    let local = digits.trim_start_matches('0');
    if local.is_empty() {
        return None;
    }
    let code = dial_code(country)?;
    Some(format!("+{code}{local}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_e164() {
        assert_eq!(
            to_e164("+61 412 345 678", "AU"),
            Some("+61412345678".into())
        );
    }

    #[test]
    fn test_double_zero_prefix() {
        assert_eq!(to_e164("0061412345678", "US"), Some("+61412345678".into()));
    }

    #[test]
    fn test_local_with_trunk_zero() {
        assert_eq!(to_e164("0412 345 678", "AU"), Some("+61412345678".into()));
        assert_eq!(to_e164("07911 123456", "GB"), Some("+447911123456".into()));
    }

    #[test]
    fn test_punctuation_stripped() {
        assert_eq!(to_e164("(04) 1234-5678", "AU"), Some("+61412345678".into()));
    }

    #[test]
    fn test_unknown_country() {
        assert_eq!(to_e164("0412345678", "XX"), None);
    }

    #[test]
    fn test_garbage() {
        assert_eq!(to_e164("", "AU"), None);
        assert_eq!(to_e164("   ", "AU"), None);
        assert_eq!(to_e164("call me", "AU"), None);
        assert_eq!(to_e164("+", "AU"), None);
        assert_eq!(to_e164("000", "AU"), None);
    }

    #[test]
    fn test_country_case_insensitive() {
        assert_eq!(to_e164("0412345678", "au"), Some("+61412345678".into()));
    }
}
