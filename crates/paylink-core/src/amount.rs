//! Fixed-point decimal amounts
//!
//! Amounts travel as decimal strings ("100", "12.50") and are compared as
//! integers scaled by 10^4. Negative values are not representable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

const SCALE_DIGITS: usize = 4;
const SCALE: u128 = 10_000;

/// Non-negative decimal amount with four fractional digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Parse a decimal string such as "100" or "99.95"
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CoreError::InvalidAmount("empty amount".into()));
        }

        let (whole, fraction) = match value.split_once('.') {
            Some((w, f)) => (w, f),
            None => (value, ""),
        };

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidAmount(value.to_string()));
        }
        if fraction.len() > SCALE_DIGITS || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidAmount(value.to_string()));
        }

        let whole: u128 = whole
            .parse()
            .map_err(|_| CoreError::InvalidAmount(value.to_string()))?;
        let mut padded = fraction.to_string();
        while padded.len() < SCALE_DIGITS {
            padded.push('0');
        }
        let fraction: u128 = padded
            .parse()
            .map_err(|_| CoreError::InvalidAmount(value.to_string()))?;

        whole
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(fraction))
            .map(Amount)
            .ok_or_else(|| CoreError::InvalidAmount(format!("{} overflows", value)))
    }

    /// Amount with no fractional part
    pub const fn from_whole(units: u64) -> Self {
        Amount(units as u128 * SCALE)
    }

    /// Value in ten-thousandths
    pub fn scaled(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let fraction = format!("{:04}", self.0 % SCALE);
        // Keep at least cents, drop trailing zeros beyond that.
        let trimmed = fraction.trim_end_matches('0');
        let fraction = if trimmed.len() < 2 { &fraction[..2] } else { trimmed };
        write!(f, "{}.{}", whole, fraction)
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Amount::parse(s)
    }
}

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Amount::parse(&s).map_err(serde::de::Error::custom)
    }
}
