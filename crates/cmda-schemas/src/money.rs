//! Monetary values as integer cents.
//!
//! All amounts in the canonical order are stored as `i64` cents so no
//! floating-point rounding is introduced at any stage. Source payloads carry
//! prices in two locale conventions:
//!
//! - `"19,90"` / `"1.234,56"` — comma decimal, dot thousands (totals block)
//! - `"19.90"` / `"1,234.56"` — dot decimal, comma thousands (item lines)
//!
//! The parser disambiguates positionally: a trailing `.` or `,` followed by
//! exactly two digits is the decimal separator; every other `.`/`,` is a
//! thousands separator and is stripped.

/// Parse a money string into integer cents.
///
/// Accepts an optional leading sign and surrounding currency noise (anything
/// that is not a digit, sign, dot or comma is ignored). Returns `None` when
/// no digits remain.
pub fn parse_money_cents(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (negative, body) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };
    // Any later '-' is noise, not a sign.
    let body: String = body.chars().filter(|c| *c != '-').collect();
    if !body.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    // Locate the decimal separator: last '.' or ',' with exactly two digits
    // after it and nothing but digits following.
    let decimal_at = body
        .rfind(['.', ','])
        .filter(|&i| body.len() - i == 3 && body[i + 1..].chars().all(|c| c.is_ascii_digit()));

    let (int_part, frac_part) = match decimal_at {
        Some(i) => (&body[..i], &body[i + 1..]),
        None => (body.as_str(), ""),
    };

    let int_digits: String = int_part.chars().filter(|c| c.is_ascii_digit()).collect();
    let int_val: i64 = if int_digits.is_empty() {
        0
    } else {
        int_digits.parse().ok()?
    };
    let frac_val: i64 = if frac_part.is_empty() {
        0
    } else {
        frac_part.parse().ok()?
    };

    let cents = int_val.checked_mul(100)?.checked_add(frac_val)?;
    Some(if negative { -cents } else { cents })
}

/// Render cents as a two-decimal string with dot separator (`1990` → `"19.90"`).
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_decimal() {
        assert_eq!(parse_money_cents("19,90"), Some(1990));
    }

    #[test]
    fn dot_decimal() {
        assert_eq!(parse_money_cents("19.90"), Some(1990));
    }

    #[test]
    fn dot_thousands_comma_decimal() {
        assert_eq!(parse_money_cents("1.234,56"), Some(123456));
    }

    #[test]
    fn comma_thousands_dot_decimal() {
        assert_eq!(parse_money_cents("1,234.56"), Some(123456));
    }

    #[test]
    fn bare_integer_is_whole_units() {
        assert_eq!(parse_money_cents("1234"), Some(123400));
    }

    #[test]
    fn currency_noise_stripped() {
        assert_eq!(parse_money_cents("R$ 4,99"), Some(499));
        assert_eq!(parse_money_cents("TOTAL(=)   19,90"), Some(1990));
    }

    #[test]
    fn negative_value() {
        assert_eq!(parse_money_cents("-4,99"), Some(-499));
    }

    #[test]
    fn empty_and_nonnumeric_rejected() {
        assert_eq!(parse_money_cents(""), None);
        assert_eq!(parse_money_cents("abc"), None);
    }

    #[test]
    fn format_round_trip() {
        assert_eq!(format_cents(1990), "19.90");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(-499), "-4.99");
        assert_eq!(parse_money_cents(&format_cents(123456)), Some(123456));
    }
}
