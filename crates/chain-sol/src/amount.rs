//! Token amounts in base units.
//!
//! Amounts are fixed-point integers scaled by the mint's decimals, so
//! `"0.01"` of a 6-decimal token is `10_000` base units. No floating point
//! is involved anywhere between user input and the instruction data.

use std::cmp::Ordering;
use std::fmt;

use crate::error::SolError;

/// An amount of a specific token, stored as base units plus the token's
/// decimal scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TokenAmount {
    base_units: u128,
    decimals: u8,
}

impl TokenAmount {
    pub const fn zero(decimals: u8) -> Self {
        Self {
            base_units: 0,
            decimals,
        }
    }

    pub const fn from_base_units(base_units: u128, decimals: u8) -> Self {
        Self {
            base_units,
            decimals,
        }
    }

    /// Parse a whole-token decimal string such as `"5"`, `"0.01"` or `"12.5"`.
    ///
    /// At most `decimals` fractional digits are accepted; anything finer
    /// cannot be represented in base units and is rejected rather than
    /// rounded.
    pub fn parse(text: &str, decimals: u8) -> Result<Self, SolError> {
        let text = text.trim();
        let invalid = |reason: &str| SolError::InvalidAmount(format!("{text:?}: {reason}"));

        let (whole, frac) = match text.split_once('.') {
            Some((w, f)) => (w, f),
            None => (text, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("empty amount"));
        }
        if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid("only digits and a single '.' are allowed"));
        }
        if frac.len() > decimals as usize {
            return Err(invalid(&format!("more than {decimals} fractional digits")));
        }

        let scale = 10u128
            .checked_pow(decimals as u32)
            .ok_or_else(|| invalid("decimal scale overflows"))?;
        let parse_part = |s: &str| -> Result<u128, SolError> {
            if s.is_empty() {
                Ok(0)
            } else {
                s.parse::<u128>().map_err(|_| invalid("amount too large"))
            }
        };

        let whole_units = parse_part(whole)?
            .checked_mul(scale)
            .ok_or_else(|| invalid("amount too large"))?;
        let frac_units = parse_part(frac)? * 10u128.pow((decimals as usize - frac.len()) as u32);

        let base_units = whole_units
            .checked_add(frac_units)
            .ok_or_else(|| invalid("amount too large"))?;

        Ok(Self {
            base_units,
            decimals,
        })
    }

    pub fn base_units(&self) -> u128 {
        self.base_units
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.base_units == 0
    }

    /// Base units as the `u64` carried in SPL instruction data.
    pub fn to_u64(&self) -> Result<u64, SolError> {
        u64::try_from(self.base_units).map_err(|_| {
            SolError::InvalidAmount(format!("{self} exceeds the u64 base-unit range"))
        })
    }

    /// Add two amounts of the same token.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        if self.decimals != other.decimals {
            return None;
        }
        self.base_units
            .checked_add(other.base_units)
            .map(|base_units| Self::from_base_units(base_units, self.decimals))
    }
}

impl PartialOrd for TokenAmount {
    /// Amounts with different scales are not comparable.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        (self.decimals == other.decimals).then(|| self.base_units.cmp(&other.base_units))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = match 10u128.checked_pow(self.decimals as u32) {
            Some(scale) if self.decimals > 0 => scale,
            _ => return write!(f, "{}", self.base_units),
        };
        let whole = self.base_units / scale;
        let frac = format!(
            "{:0width$}",
            self.base_units % scale,
            width = self.decimals as usize
        );
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            write!(f, "{whole}.0")
        } else {
            write!(f, "{whole}.{frac}")
        }
    }
}
