use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::str::FromStr;

// Date layouts seen across ownership documents and SGML headers, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y", "%m-%d-%Y", "%Y/%m/%d"];

const DATETIME_FORMATS: &[&str] = &["%Y%m%d%H%M%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

const TRUE_VALUES: &[&str] = &["1", "true"];
const FALSE_VALUES: &[&str] = &["0", "false"];

/// Reads a boolean flag encoded as `1`/`0` or `true`/`false`.
///
/// Matching is case-insensitive. Anything else yields `None` so callers can
/// tell a missing flag apart from an explicit `false`.
pub fn parse_flag(raw: &str) -> Option<bool> {
    let value = raw.trim();
    if TRUE_VALUES.iter().any(|t| value.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if FALSE_VALUES.iter().any(|f| value.eq_ignore_ascii_case(f)) {
        Some(false)
    } else {
        None
    }
}

/// Parses a calendar date, trying each known layout in turn.
///
/// Values carrying a timezone or time suffix (`2023-01-05-05:00`,
/// `2023-01-05T00:00:00`) fall back to their leading `YYYY-MM-DD` part.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }

    if value.len() > 10 && value.is_char_boundary(10) {
        if let Ok(date) = NaiveDate::parse_from_str(&value[..10], "%Y-%m-%d") {
            return Some(date);
        }
    }

    None
}

pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let value = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

/// Parses share counts and prices. Thousands separators, currency signs and
/// scientific notation are tolerated.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
        .map(|d| d.normalize())
}

/// Strips leading zeros from a CIK. Non-digit characters are dropped first.
pub fn normalize_cik(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        Some("0".to_string())
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_encodings() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("false"), Some(false));
        assert_eq!(parse_flag(""), None);
        assert_eq!(parse_flag("yes"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 1, 5).unwrap();
        assert_eq!(parse_date("2023-01-05"), Some(expected));
        assert_eq!(parse_date("20230105"), Some(expected));
        assert_eq!(parse_date("01/05/2023"), Some(expected));
        assert_eq!(parse_date("2023-01-05-05:00"), Some(expected));
        assert_eq!(parse_date("2023-01-05T10:00:00"), Some(expected));
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("2023-13-45"), None);
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("1,000"), Some(Decimal::from(1000)));
        assert_eq!(parse_decimal("$12.50"), Some(Decimal::new(125, 1)));
        assert_eq!(parse_decimal("1.5e3"), Some(Decimal::from(1500)));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("n/a"), None);
    }

    #[test]
    fn test_normalize_cik() {
        assert_eq!(normalize_cik("0001770787").as_deref(), Some("1770787"));
        assert_eq!(normalize_cik("1770787").as_deref(), Some("1770787"));
        assert_eq!(normalize_cik("0000").as_deref(), Some("0"));
        assert_eq!(normalize_cik("  "), None);
    }

    #[test]
    fn test_parse_datetime() {
        let dt = parse_datetime("20230103161514").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2023, 1, 3).unwrap());
    }
}
