//! Fixed-point money type.
//!
//! All monetary values in this workspace use a 1e-6 (micros) fixed-point
//! representation stored as `i64`. 1 USD = 1_000_000 micros. Stored
//! aggregates are always in the normalized unit; adapter output may still be
//! in an account's native currency until it passes through `adl-fx`.
//!
//! There is intentionally no `From<i64>`: callers must be deliberate about
//! when a raw integer represents money.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Micros per whole currency unit.
pub const MICROS_SCALE: i64 = 1_000_000;

/// A fixed-point monetary amount at 1e-6 scale.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Micros(i64);

impl Micros {
    pub const ZERO: Micros = Micros(0);
    pub const MAX: Micros = Micros(i64::MAX);

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Micros(raw)
    }

    /// Whole units, e.g. `Micros::from_units(100)` is 100.000000.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Micros(units * MICROS_SCALE)
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub fn saturating_add(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_add(rhs.0))
    }

    /// Negative amounts become zero. Aggregated money is non-negative.
    #[inline]
    pub fn clamp_non_negative(self) -> Micros {
        Micros(self.0.max(0))
    }

    /// Lossy view for reporting and FX division.
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / MICROS_SCALE as f64
    }

    /// Divide by a floating rate and round half away from zero to the
    /// nearest micro. Returns `None` for non-finite or non-positive rates or
    /// when the result does not fit in `i64`.
    pub fn div_rate(self, rate: f64) -> Option<Micros> {
        if !rate.is_finite() || rate <= 0.0 {
            return None;
        }
        let out = (self.0 as f64 / rate).round();
        if !out.is_finite() || out > i64::MAX as f64 || out < i64::MIN as f64 {
            return None;
        }
        Some(Micros(out as i64))
    }

    /// Round a provider-supplied float (e.g. `9.99`) to the nearest micro.
    pub fn from_f64(units: f64) -> Option<Micros> {
        let out = (units * MICROS_SCALE as f64).round();
        if !out.is_finite() || out > i64::MAX as f64 || out < i64::MIN as f64 {
            return None;
        }
        Some(Micros(out as i64))
    }

    /// Convert an integer amount in a currency's minor unit (cents, or whole
    /// yen for zero-decimal currencies) to micros.
    pub fn from_minor_units(minor: i64, exponent: u32) -> Option<Micros> {
        if exponent > 6 {
            return None;
        }
        let factor = 10_i64.pow(6 - exponent);
        minor.checked_mul(factor).map(Micros)
    }
}

impl Add for Micros {
    type Output = Micros;
    #[inline]
    fn add(self, rhs: Micros) -> Micros {
        Micros(self.0 + rhs.0)
    }
}

impl Sub for Micros {
    type Output = Micros;
    #[inline]
    fn sub(self, rhs: Micros) -> Micros {
        Micros(self.0 - rhs.0)
    }
}

impl AddAssign for Micros {
    #[inline]
    fn add_assign(&mut self, rhs: Micros) {
        self.0 += rhs.0;
    }
}

impl Sum for Micros {
    fn sum<I: Iterator<Item = Micros>>(iter: I) -> Micros {
        iter.fold(Micros::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Micros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / MICROS_SCALE;
        let frac = (self.0 % MICROS_SCALE).abs();
        if self.0 < 0 && whole == 0 {
            write!(f, "-{whole}.{frac:06}")
        } else {
            write!(f, "{whole}.{frac:06}")
        }
    }
}

// ---------------------------------------------------------------------------
// Decimal parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecimalError {
    #[error("decimal is empty")]
    Empty,
    #[error("decimal could not be parsed: '{0}'")]
    Invalid(String),
    #[error("decimal out of range: '{0}'")]
    Overflow(String),
}

/// Parse a decimal string (`"12.34"`, `"-0.5"`, `"7"`) into micros without
/// touching floating point. Digits past the sixth decimal place are
/// truncated; provider spend is never reported that finely.
pub fn parse_decimal_micros(s: &str) -> Result<Micros, DecimalError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DecimalError::Empty);
    }

    let (negative, digits) = if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    };

    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part) {
        return Err(DecimalError::Invalid(s.to_string()));
    }

    let int_val: i64 = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse()
            .map_err(|_| DecimalError::Overflow(s.to_string()))?
    };

    let frac_trunc: String = frac_part.chars().take(6).collect();
    let frac_val: i64 = if frac_trunc.is_empty() {
        0
    } else {
        let padded = format!("{frac_trunc:0<6}");
        padded
            .parse()
            .map_err(|_| DecimalError::Invalid(s.to_string()))?
    };

    let raw = int_val
        .checked_mul(MICROS_SCALE)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or_else(|| DecimalError::Overflow(s.to_string()))?;

    Ok(Micros(if negative { -raw } else { raw }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_fractional_values() {
        assert_eq!(parse_decimal_micros("12.34").unwrap(), Micros::new(12_340_000));
        assert_eq!(parse_decimal_micros("7").unwrap(), Micros::from_units(7));
        assert_eq!(parse_decimal_micros(".5").unwrap(), Micros::new(500_000));
        assert_eq!(parse_decimal_micros("-0.25").unwrap(), Micros::new(-250_000));
    }

    #[test]
    fn truncates_past_six_places() {
        assert_eq!(
            parse_decimal_micros("1.1234569").unwrap(),
            Micros::new(1_123_456)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_decimal_micros(""), Err(DecimalError::Empty));
        assert!(matches!(parse_decimal_micros("1.2.3"), Err(DecimalError::Invalid(_))));
        assert!(matches!(parse_decimal_micros("abc"), Err(DecimalError::Invalid(_))));
        assert!(matches!(parse_decimal_micros("-"), Err(DecimalError::Invalid(_))));
    }

    #[test]
    fn div_rate_rounds_to_nearest_micro() {
        let eur = Micros::from_units(100);
        assert_eq!(eur.div_rate(0.92), Some(Micros::new(108_695_652)));
        assert_eq!(eur.div_rate(0.0), None);
        assert_eq!(eur.div_rate(f64::NAN), None);
    }

    #[test]
    fn minor_units_respect_exponent() {
        assert_eq!(Micros::from_minor_units(1999, 2), Some(Micros::new(19_990_000)));
        assert_eq!(Micros::from_minor_units(500, 0), Some(Micros::from_units(500)));
        assert_eq!(Micros::from_minor_units(1, 7), None);
    }

    #[test]
    fn display_formats_with_six_decimal_places() {
        assert_eq!(Micros::new(1_500_000).to_string(), "1.500000");
        assert_eq!(Micros::new(-250_000).to_string(), "-0.250000");
    }

    #[test]
    fn serializes_as_raw_integer() {
        let v = serde_json::to_value(Micros::new(42)).unwrap();
        assert_eq!(v, serde_json::json!(42));
    }
}
