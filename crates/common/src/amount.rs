//! Arbitrary-precision decimal amounts.
//!
//! Balances and transfer values use [`Amount`], a signed decimal with a
//! fixed scale of [`AMOUNT_SCALE`] fractional digits over an
//! arbitrary-precision integer mantissa. Replicas must derive bit-identical
//! balances from the same transaction history, so the crate commits to one
//! rounding rule and applies it everywhere:
//!
//! **Round half-up at 8 decimal places, ties away from zero.**
//!
//! Every constructor normalizes to that scale, addition and subtraction
//! are exact at that scale, and the canonical string form
//! ([`Amount::to_plain_string`]) trims trailing zeros, so structurally
//! equal amounts always store identically.

use std::cmp::Ordering;
use std::str::FromStr;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::{Error, Result};

/// Number of fractional decimal digits every amount carries.
pub const AMOUNT_SCALE: u32 = 8;

fn scale_factor() -> BigInt {
    BigInt::from(10u64.pow(AMOUNT_SCALE))
}

fn half_scale() -> BigInt {
    BigInt::from(10u64.pow(AMOUNT_SCALE) / 2)
}

/// A fixed-scale arbitrary-precision decimal.
///
/// The stored value is `units / 10^8`. All arithmetic stays exact at
/// scale 8; anything finer is rounded half-up on entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Amount {
    units: BigInt,
}

impl Amount {
    /// The zero amount.
    pub fn zero() -> Self {
        Amount { units: BigInt::zero() }
    }

    /// Build from an integral token count.
    pub fn from_integer(value: i64) -> Self {
        Amount {
            units: BigInt::from(value) * scale_factor(),
        }
    }

    /// Build from a raw scale-8 mantissa.
    pub fn from_units(units: BigInt) -> Self {
        Amount { units }
    }

    /// Parse a decimal string such as `"12"`, `"-3.5"` or `"0.000000015"`.
    ///
    /// Fractional digits beyond scale 8 are rounded half-up. Anything that
    /// is not an optionally signed decimal number is rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(Error::InvalidAmount(format!("not a number: {text:?}")));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(Error::InvalidAmount(format!("not a number: {text:?}")));
        }

        let int_units = if int_part.is_empty() {
            BigInt::zero()
        } else {
            // all-digit string, cannot fail
            BigInt::from_str(int_part)
                .map_err(|e| Error::InvalidAmount(format!("{text:?}: {e}")))?
        };

        let scale = AMOUNT_SCALE as usize;
        let (kept, dropped) = if frac_part.len() > scale {
            frac_part.split_at(scale)
        } else {
            (frac_part, "")
        };
        let mut frac_units = if kept.is_empty() {
            BigInt::zero()
        } else {
            let padded = format!("{kept:0<width$}", width = scale);
            BigInt::from_str(&padded)
                .map_err(|e| Error::InvalidAmount(format!("{text:?}: {e}")))?
        };
        // round half-up on the first dropped digit
        if dropped.as_bytes().first().is_some_and(|d| *d >= b'5') {
            frac_units += 1;
        }

        let mut units = int_units * scale_factor() + frac_units;
        if negative {
            units = -units;
        }
        Ok(Amount { units })
    }

    /// True when the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.units.is_zero()
    }

    /// True when the value is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.units.is_positive()
    }

    /// True when the value is strictly negative.
    pub fn is_negative(&self) -> bool {
        self.units.is_negative()
    }

    /// Magnitude of the value.
    pub fn abs(&self) -> Amount {
        Amount {
            units: self.units.abs(),
        }
    }

    /// Exact sum at scale 8.
    pub fn add(&self, other: &Amount) -> Amount {
        Amount {
            units: &self.units + &other.units,
        }
    }

    /// Exact difference at scale 8. May go negative; the ledger checks
    /// the sign before persisting.
    pub fn sub(&self, other: &Amount) -> Amount {
        Amount {
            units: &self.units - &other.units,
        }
    }

    /// Multiply by an integer factor, exact at scale 8.
    pub fn mul_integer(&self, factor: u64) -> Amount {
        Amount {
            units: &self.units * BigInt::from(factor),
        }
    }

    /// Round to the nearest integer token count, half-up, ties away from
    /// zero. This is the platform rounding rule.
    pub fn to_integer_round(&self) -> BigInt {
        let magnitude = (self.units.abs() + half_scale()) / scale_factor();
        if self.units.is_negative() {
            -magnitude
        } else {
            magnitude
        }
    }

    /// [`Amount::to_integer_round`] narrowed to `u64`.
    ///
    /// Returns `None` for negative amounts or values past `u64::MAX`.
    pub fn to_u64_round(&self) -> Option<u64> {
        self.to_integer_round().to_u64()
    }

    /// Canonical decimal string: trailing fractional zeros trimmed,
    /// `"0"` for zero. This is the form persisted in the ledger.
    pub fn to_plain_string(&self) -> String {
        let (int_part, frac_part) = {
            let magnitude = self.units.abs();
            let int = &magnitude / scale_factor();
            let frac = &magnitude % scale_factor();
            (int, frac)
        };
        let sign = if self.units.is_negative() { "-" } else { "" };
        if frac_part.is_zero() {
            return format!("{sign}{int_part}");
        }
        let frac = format!("{frac_part:0>width$}", width = AMOUNT_SCALE as usize);
        let frac = frac.trim_end_matches('0');
        format!("{sign}{int_part}.{frac}")
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> Ordering {
        self.units.cmp(&other.units)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Amount::parse(s)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_plain_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Transactions may carry amounts as JSON strings or numbers.
        let value = serde_json::Value::deserialize(deserializer)?;
        let text = match &value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(de::Error::custom(format!(
                    "amount must be a string or number, got {other}"
                )))
            }
        };
        Amount::parse(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    #[test]
    fn test_parse_and_format_roundtrip() {
        assert_eq!(amt("12").to_plain_string(), "12");
        assert_eq!(amt("12.5").to_plain_string(), "12.5");
        assert_eq!(amt("-3.50").to_plain_string(), "-3.5");
        assert_eq!(amt("0.00000001").to_plain_string(), "0.00000001");
        assert_eq!(amt("0").to_plain_string(), "0");
        assert_eq!(amt(".5").to_plain_string(), "0.5");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Amount::parse("").is_err());
        assert!(Amount::parse("abc").is_err());
        assert!(Amount::parse("1.2.3").is_err());
        assert!(Amount::parse("1e5").is_err());
        assert!(Amount::parse(".").is_err());
    }

    #[test]
    fn test_rounds_half_up_past_scale() {
        // 9th fractional digit 5 rounds up
        assert_eq!(amt("0.000000015").to_plain_string(), "0.00000002");
        // 9th fractional digit 4 rounds down
        assert_eq!(amt("0.000000014").to_plain_string(), "0.00000001");
        // ties away from zero on negatives
        assert_eq!(amt("-0.000000015").to_plain_string(), "-0.00000002");
    }

    #[test]
    fn test_exact_arithmetic() {
        assert_eq!(amt("0.1").add(&amt("0.2")).to_plain_string(), "0.3");
        assert_eq!(amt("1").sub(&amt("0.00000001")).to_plain_string(), "0.99999999");
        assert!(amt("1").sub(&amt("2")).is_negative());
    }

    #[test]
    fn test_arbitrary_precision() {
        let big = amt("99999999999999999999999999999999");
        let sum = big.add(&amt("1"));
        assert_eq!(sum.to_plain_string(), "100000000000000000000000000000000");
    }

    #[test]
    fn test_integer_rounding() {
        assert_eq!(amt("2.5").to_u64_round(), Some(3));
        assert_eq!(amt("2.4").to_u64_round(), Some(2));
        assert_eq!(amt("-1").to_u64_round(), None);
        assert_eq!(amt("0.5").mul_integer(3).to_u64_round(), Some(2)); // 1.5 -> 2
    }

    #[test]
    fn test_ordering() {
        assert!(amt("1.5") > amt("1.49999999"));
        assert!(amt("-1") < Amount::zero());
    }
}
