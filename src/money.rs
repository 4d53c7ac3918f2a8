//! Money Module
//!
//! Fixed-point amounts for the ledger. All balances and transfer amounts are
//! `Amount`, a non-negative `Decimal` held at exactly [`MONEY_SCALE`] fraction
//! digits. Floats never appear on the money path.
//!
//! ## Parsing rules
//! Client amounts arrive as strings and are parsed strictly:
//! - `.5` and `5.` are rejected (use `0.5` / `5`)
//! - scientific notation, `+` prefixes and negatives are rejected
//! - more than two fraction digits is an error, never a silent rounding
//!
//! ```rust
//! use transfer_core::money::Amount;
//!
//! let a: Amount = "300.5".parse().unwrap();
//! assert_eq!(a.to_string(), "300.50");
//! ```

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fraction digits of the demo currency
pub const MONEY_SCALE: u32 = 2;

/// Money parsing / arithmetic errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount cannot be negative")]
    Negative,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Non-negative fixed-point amount with two fraction digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Build from a `Decimal`, rejecting negatives and excess precision
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MoneyError::Negative);
        }
        let normalized = value.normalize();
        if normalized.scale() > MONEY_SCALE {
            return Err(MoneyError::PrecisionOverflow {
                provided: normalized.scale(),
                max: MONEY_SCALE,
            });
        }
        let mut fixed = normalized;
        fixed.rescale(MONEY_SCALE);
        Ok(Self(fixed))
    }

    /// Whole currency units, e.g. `Amount::from_units(50)` is `50.00`
    pub fn from_units(units: u64) -> Self {
        let mut d = Decimal::from(units);
        d.rescale(MONEY_SCALE);
        Self(d)
    }

    /// Minor units (cents), e.g. `Amount::from_minor(30_050)` is `300.50`
    pub fn from_minor(minor: u64) -> Self {
        // every u64 fits the 96-bit mantissa
        Self(Decimal::from_i128_with_scale(i128::from(minor), MONEY_SCALE))
    }

    #[inline]
    pub fn inner(self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn checked_add(self, other: Amount) -> Result<Amount, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(MoneyError::Overflow)
    }

    /// Subtraction that refuses to go below zero
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        if other.0 > self.0 {
            return None;
        }
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Thousands-separated display, e.g. `1,234,567.50`
    pub fn format_grouped(self) -> String {
        let plain = self.to_string();
        let (whole, frac) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        format!("{}.{}", grouped, frac)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.prec$}", self.0, prec = MONEY_SCALE as usize)
    }
}

impl FromStr for Amount {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MoneyError::InvalidFormat("amount cannot be empty".into()));
        }
        if s.starts_with('-') {
            return Err(MoneyError::Negative);
        }
        if s.starts_with('+') {
            return Err(MoneyError::InvalidFormat("+ prefix not allowed".into()));
        }
        if s.starts_with('.') {
            return Err(MoneyError::InvalidFormat("use 0.5 not .5".into()));
        }
        if s.ends_with('.') {
            return Err(MoneyError::InvalidFormat("use 5 not 5.".into()));
        }
        if s.contains('e') || s.contains('E') {
            return Err(MoneyError::InvalidFormat(
                "scientific notation not allowed".into(),
            ));
        }
        if let Some((_, frac)) = s.split_once('.')
            && frac.len() > MONEY_SCALE as usize
        {
            return Err(MoneyError::PrecisionOverflow {
                provided: frac.len() as u32,
                max: MONEY_SCALE,
            });
        }

        let d = Decimal::from_str(s).map_err(|e| MoneyError::InvalidFormat(e.to_string()))?;
        Amount::new(d)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(a: Amount) -> Self {
        a.0
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Always a string to preserve precision
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        // JSON numbers would bypass the format rules, so only strings are accepted
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(D::Error::custom)
    }
}
