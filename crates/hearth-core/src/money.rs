// SPDX-License-Identifier: BUSL-1.1
//! # Money
//!
//! [`Amount`] is a non-negative count of minor currency units (cents for
//! `usd`). Decimal major-unit strings are parsed exactly, digit by digit,
//! and rounded half away from zero to two fractional digits. Floating-point
//! arithmetic is never used on the path from request body to processor call.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Number of minor units in one major unit.
const MINOR_PER_MAJOR: i64 = 100;

/// Fractional digits kept after rounding.
const SCALE: usize = 2;

/// A non-negative monetary amount in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Build an amount from minor units. Negative values are rejected.
    pub fn from_minor_units(minor: i64) -> Result<Self, ValidationError> {
        if minor < 0 {
            return Err(ValidationError::InvalidAmount {
                value: minor.to_string(),
                reason: "amount must not be negative".into(),
            });
        }
        Ok(Self(minor))
    }

    /// Parse a decimal major-unit string such as `"450"`, `"199.99"` or
    /// `"12.345"` (which rounds to 1235 minor units).
    pub fn from_decimal_str(input: &str) -> Result<Self, ValidationError> {
        let s = input.trim();
        let invalid = |reason: &str| ValidationError::InvalidAmount {
            value: input.to_string(),
            reason: reason.to_string(),
        };
        let overflow = || ValidationError::AmountOverflow {
            value: input.to_string(),
        };

        if s.is_empty() {
            return Err(invalid("amount is empty"));
        }
        if s.starts_with('-') {
            return Err(invalid("amount must not be negative"));
        }
        let s = s.strip_prefix('+').unwrap_or(s);
        if s.contains(['e', 'E']) {
            return Err(invalid("exponent notation is not supported"));
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("amount has no digits"));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("amount must be a decimal number"));
        }

        let mut minor: i64 = 0;
        for b in whole.bytes() {
            minor = minor
                .checked_mul(10)
                .and_then(|m| m.checked_add(i64::from(b - b'0')))
                .ok_or_else(overflow)?;
        }
        minor = minor.checked_mul(MINOR_PER_MAJOR).ok_or_else(overflow)?;

        let frac_digits = frac.as_bytes();
        let mut cents: i64 = 0;
        for i in 0..SCALE {
            let digit = frac_digits.get(i).map(|b| i64::from(b - b'0')).unwrap_or(0);
            cents = cents * 10 + digit;
        }
        minor = minor.checked_add(cents).ok_or_else(overflow)?;

        // Half away from zero: the first dropped digit decides.
        if frac_digits.get(SCALE).is_some_and(|b| *b >= b'5') {
            minor = minor.checked_add(1).ok_or_else(overflow)?;
        }

        Ok(Self(minor))
    }

    /// The amount in minor units.
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
}

impl TryFrom<i64> for Amount {
    type Error = ValidationError;

    fn try_from(minor: i64) -> Result<Self, Self::Error> {
        Self::from_minor_units(minor)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> i64 {
        amount.0
    }
}

impl std::fmt::Display for Amount {
    /// Major units with two fractional digits, e.g. `450.00`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.0 / MINOR_PER_MAJOR,
            self.0 % MINOR_PER_MAJOR
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn minor(s: &str) -> i64 {
        Amount::from_decimal_str(s).unwrap().minor_units()
    }

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(minor("450"), 45_000);
        assert_eq!(minor("199.99"), 19_999);
        assert_eq!(minor("0.5"), 50);
        assert_eq!(minor(".5"), 50);
        assert_eq!(minor("7."), 700);
        assert_eq!(minor(" 12.30 "), 1_230);
        assert_eq!(minor("+3"), 300);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(minor("12.345"), 1_235);
        assert_eq!(minor("12.344"), 1_234);
        assert_eq!(minor("12.3449"), 1_234);
        assert_eq!(minor("0.005"), 1);
        assert_eq!(minor("0.004999"), 0);
        assert_eq!(minor("99.995"), 10_000);
    }

    #[test]
    fn rejects_negative_empty_and_malformed() {
        for bad in ["", "   ", "-1", "-0.01", "abc", "1.2.3", "1,50", ".", "1e3", "$5"] {
            assert!(Amount::from_decimal_str(bad).is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn rejects_overflow() {
        let err = Amount::from_decimal_str("999999999999999999999").unwrap_err();
        assert!(matches!(err, ValidationError::AmountOverflow { .. }));
    }

    #[test]
    fn display_uses_two_fraction_digits() {
        assert_eq!(Amount::from_minor_units(45_000).unwrap().to_string(), "450.00");
        assert_eq!(Amount::from_minor_units(5).unwrap().to_string(), "0.05");
        assert_eq!(Amount::ZERO.to_string(), "0.00");
    }

    #[test]
    fn serde_uses_minor_units_and_rejects_negative() {
        let a = Amount::from_minor_units(25_000).unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), "25000");
        assert!(serde_json::from_str::<Amount>("-1").is_err());
    }

    proptest! {
        #[test]
        fn two_digit_strings_parse_exactly(whole in 0i64..10_000_000, cents in 0i64..100) {
            let s = format!("{whole}.{cents:02}");
            prop_assert_eq!(minor(&s), whole * 100 + cents);
        }

        #[test]
        fn display_round_trips(m in 0i64..1_000_000_000) {
            let a = Amount::from_minor_units(m).unwrap();
            prop_assert_eq!(Amount::from_decimal_str(&a.to_string()).unwrap(), a);
        }
    }
}
