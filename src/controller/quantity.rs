//! Numeric handling of Kubernetes resource quantities
//!
//! `Quantity` in k8s-openapi is a plain string; comparisons between a user
//! value and a default (`"3"` vs `"1"`, `"250m"` vs `"1"`, `"1Gi"` vs `"4Gi"`)
//! need the canonical numeric value.

use std::cmp::Ordering;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::error::{Error, Result};

const KI: i128 = 1 << 10;
const MI: i128 = 1 << 20;
const GI: i128 = 1 << 30;

/// (numerator, denominator) multiplier for a suffix
fn suffix_multiplier(suffix: &str) -> Option<(i128, i128)> {
    let m = match suffix {
        "" => (1, 1),
        "n" => (1, 1_000_000_000),
        "u" => (1, 1_000_000),
        "m" => (1, 1_000),
        "k" => (1_000, 1),
        "M" => (1_000_000, 1),
        "G" => (1_000_000_000, 1),
        "T" => (1_000_000_000_000, 1),
        "P" => (1_000_000_000_000_000, 1),
        "E" => (1_000_000_000_000_000_000, 1),
        "Ki" => (KI, 1),
        "Mi" => (MI, 1),
        "Gi" => (GI, 1),
        "Ti" => (GI * KI, 1),
        "Pi" => (GI * MI, 1),
        "Ei" => (GI * GI, 1),
        exp if exp.starts_with(['e', 'E']) && exp.len() > 1 => {
            let power: i32 = exp[1..].parse().ok()?;
            if power >= 0 {
                (10_i128.checked_pow(power.unsigned_abs())?, 1)
            } else {
                (1, 10_i128.checked_pow(power.unsigned_abs())?)
            }
        }
        _ => return None,
    };
    Some(m)
}

/// Value of a quantity string in thousandths of its base unit.
///
/// `"250m"` is 250, `"1"` is 1000, `"1Ki"` is 1_024_000. Sub-milli precision
/// is truncated toward zero. Returns `None` for anything that is not a
/// Kubernetes quantity.
pub fn milli_value(raw: &str) -> Option<i128> {
    let s = raw.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let number_len = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(number_len);
    if number.is_empty() || number == "." {
        return None;
    }

    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    if frac_part.contains('.') {
        return None;
    }

    let digits = format!("{int_part}{frac_part}");
    let mantissa: i128 = digits.parse().ok()?;
    let scale = 10_i128.checked_pow(u32::try_from(frac_part.len()).ok()?)?;
    let (mul, div) = suffix_multiplier(suffix)?;

    let value = mantissa
        .checked_mul(mul)?
        .checked_mul(1_000)?
        .checked_div(scale.checked_mul(div)?)?;

    Some(if negative { -value } else { value })
}

/// Milli value of a quantity, reporting `field` when it does not parse
pub fn parse(quantity: &Quantity, field: &str) -> Result<i128> {
    milli_value(&quantity.0).ok_or_else(|| Error::InvalidQuantity {
        field: field.to_string(),
        value: quantity.0.clone(),
    })
}

/// Compare two quantities numerically
pub fn compare(a: &Quantity, b: &Quantity, field: &str) -> Result<Ordering> {
    Ok(parse(a, field)?.cmp(&parse(b, field)?))
}

/// Whole bytes of a memory quantity
pub fn bytes(quantity: &Quantity, field: &str) -> Result<i128> {
    Ok(parse(quantity, field)? / 1_000)
}

pub const BYTES_PER_GI: i128 = GI;
pub const BYTES_PER_MI: i128 = MI;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_quantities() {
        assert_eq!(milli_value("250m"), Some(250));
        assert_eq!(milli_value("1"), Some(1_000));
        assert_eq!(milli_value("1.5"), Some(1_500));
        assert_eq!(milli_value("0.1"), Some(100));
    }

    #[test]
    fn test_binary_and_decimal_suffixes() {
        assert_eq!(milli_value("1Ki"), Some(1_024_000));
        assert_eq!(milli_value("4Gi"), Some(4 * GI * 1_000));
        assert_eq!(milli_value("2G"), Some(2_000_000_000_000));
        assert_eq!(milli_value("1e3"), Some(1_000_000));
        assert_eq!(milli_value("150Mi"), Some(150 * MI * 1_000));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(milli_value(""), None);
        assert_eq!(milli_value("Gi"), None);
        assert_eq!(milli_value("1.2.3"), None);
        assert_eq!(milli_value("10 apples"), None);
        assert_eq!(milli_value("4GB"), None);
    }

    #[test]
    fn test_compare_mixed_units() {
        let q = |s: &str| Quantity(s.to_string());
        assert_eq!(compare(&q("250m"), &q("1"), "cpu").unwrap(), Ordering::Less);
        assert_eq!(compare(&q("1Gi"), &q("1024Mi"), "memory").unwrap(), Ordering::Equal);
        assert_eq!(compare(&q("10Gi"), &q("4Gi"), "memory").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_parse_reports_field() {
        let err = parse(&Quantity("lots".to_string()), "spec.nodes.memory").unwrap_err();
        match err {
            Error::InvalidQuantity { field, value } => {
                assert_eq!(field, "spec.nodes.memory");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
