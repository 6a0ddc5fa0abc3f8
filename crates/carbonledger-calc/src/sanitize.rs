//! Locale-aware parsing of supplier-submitted numbers.
//!
//! Suppliers paste amounts from spreadsheets in whatever convention their
//! locale uses. Everything is reduced to a plain `Decimal`:
//!
//! | input          | hint | result     |
//! |----------------|------|------------|
//! | `1,234.56`     | US   | `1234.56`  |
//! | `1.234,56`     | EU   | `1234.56`  |
//! | `1.234.567,8`  | auto | `1234567.8`|
//! | `1.23E+06`     | any  | `1230000`  |
//! | `(1,200)`      | US   | `-1200`    |
//!
//! Sign is passed through untouched; domain sign rules belong to the caller.

use std::str::FromStr;

use carbonledger_core::{LocaleHint, RawAmount};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::error::CalcError;

/// Cell contents that mean "no value".
pub const NULL_MARKERS: &[&str] = &["n/a", "na", "-", "--", "null", "none", "nan"];

/// Sanitize a raw amount into a normalized decimal.
pub fn sanitize_number(raw: &RawAmount, locale: LocaleHint) -> Result<Decimal, CalcError> {
    match raw {
        RawAmount::Decimal(d) => Ok(d.normalize()),
        RawAmount::Float(v) => {
            if !v.is_finite() {
                return Err(CalcError::parse(&v.to_string(), "not a finite number"));
            }
            Decimal::from_f64(*v)
                .map(|d| d.normalize())
                .ok_or_else(|| CalcError::parse(&v.to_string(), "out of decimal range"))
        }
        RawAmount::Text(s) => sanitize_str(s, locale),
    }
}

/// Sanitize a numeric string.
pub fn sanitize_str(raw: &str, locale: LocaleHint) -> Result<Decimal, CalcError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CalcError::parse(raw, "empty value"));
    }
    if NULL_MARKERS.iter().any(|m| trimmed.eq_ignore_ascii_case(m)) {
        return Err(CalcError::parse(raw, "null marker"));
    }

    // Strip grouping characters that carry no decimal meaning.
    let mut cleaned: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '\u{2019}')
        .collect();

    // Accounting negatives: (1,200.00)
    let mut negate = false;
    if cleaned.starts_with('(') && cleaned.ends_with(')') && cleaned.len() > 2 {
        cleaned = cleaned[1..cleaned.len() - 1].to_string();
        negate = true;
    }

    let value = if cleaned.contains(['e', 'E']) {
        parse_scientific(raw, &cleaned, locale)?
    } else {
        let locale = match locale {
            LocaleHint::Auto => detect_locale(&cleaned),
            explicit => explicit,
        };
        let canonical = match locale {
            LocaleHint::Eu => cleaned.replace('.', "").replace(',', "."),
            _ => cleaned.replace(',', ""),
        };
        parse_plain(raw, &canonical)?
    };

    Ok(if negate { -value } else { value }.normalize())
}

/// Guess the convention of an unhinted string.
///
/// Exactly one comma with several dots, or a comma as the last separator, is
/// EU style. A lone comma followed by one or two digits is a decimal comma.
/// Several dots and no comma are EU thousands groups. Anything else is US.
pub fn detect_locale(s: &str) -> LocaleHint {
    let commas = s.matches(',').count();
    let dots = s.matches('.').count();

    if commas == 1 && dots > 1 {
        return LocaleHint::Eu;
    }
    if commas > 0 && dots > 0 {
        return match (s.rfind(','), s.rfind('.')) {
            (Some(c), Some(d)) if c > d => LocaleHint::Eu,
            _ => LocaleHint::Us,
        };
    }
    if commas == 1
        && let Some(pos) = s.find(',')
    {
        let tail = &s[pos + 1..];
        if (1..=2).contains(&tail.len()) && tail.chars().all(|c| c.is_ascii_digit()) {
            return LocaleHint::Eu;
        }
    }
    if commas == 0 && dots > 1 {
        return LocaleHint::Eu;
    }
    LocaleHint::Us
}

fn parse_plain(raw: &str, s: &str) -> Result<Decimal, CalcError> {
    let unsigned = s.strip_prefix('+').unwrap_or(s);
    let digits = unsigned.strip_prefix('-').unwrap_or(unsigned);
    if digits.is_empty() {
        return Err(CalcError::parse(raw, "no digits"));
    }
    if !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(CalcError::parse(raw, "unexpected characters"));
    }
    if digits.matches('.').count() > 1 {
        return Err(CalcError::parse(raw, "ambiguous separators"));
    }
    if !digits.chars().any(|c| c.is_ascii_digit()) {
        return Err(CalcError::parse(raw, "no digits"));
    }
    Decimal::from_str(unsigned).map_err(|e| CalcError::parse(raw, e.to_string()))
}

fn parse_scientific(raw: &str, s: &str, locale: LocaleHint) -> Result<Decimal, CalcError> {
    let Some(split) = s.find(['e', 'E']) else {
        return Err(CalcError::parse(raw, "missing exponent"));
    };
    let (mantissa, exponent) = (&s[..split], &s[split + 1..]);

    let decimal_comma = matches!(locale, LocaleHint::Eu)
        || (matches!(locale, LocaleHint::Auto) && !mantissa.contains('.'));
    let mantissa = if decimal_comma {
        mantissa.replace(',', ".")
    } else {
        mantissa.replace(',', "")
    };
    let mantissa = parse_plain(raw, &mantissa)?;

    let exponent = exponent.strip_prefix('+').unwrap_or(exponent);
    let exponent: i32 = exponent
        .parse()
        .map_err(|_| CalcError::parse(raw, "invalid exponent"))?;
    if exponent.unsigned_abs() > 28 {
        return Err(CalcError::parse(raw, "exponent out of range"));
    }

    let scale = Decimal::from_i128_with_scale(10i128.pow(exponent.unsigned_abs()), 0);
    let value = if exponent >= 0 {
        mantissa.checked_mul(scale)
    } else {
        mantissa.checked_div(scale)
    };
    value.ok_or_else(|| CalcError::parse(raw, "out of decimal range"))
}
