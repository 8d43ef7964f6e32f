//! Price arithmetic in minor units
//!
//! All prices are fixed USDC amounts with 6 decimal places, stored as
//! integer minor units. Arithmetic is checked: overflow is an explicit
//! error, never a silent wrap.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PaylaneError, Result};

/// Number of decimal places in the settlement asset (USDC)
pub const PRICE_DECIMALS: u32 = 6;

/// A fixed price in minor units of the settlement asset
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Price(pub u64);

impl Price {
    /// Create a price from minor units
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// The zero price
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Raw minor units
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Checked addition
    pub fn checked_add(&self, other: Price) -> Result<Price> {
        self.0
            .checked_add(other.0)
            .map(Price)
            .ok_or(PaylaneError::PriceOverflow)
    }

    /// Sum an iterator of prices with overflow checking
    pub fn checked_sum<I: IntoIterator<Item = Price>>(prices: I) -> Result<Price> {
        prices
            .into_iter()
            .try_fold(Price::zero(), |acc, p| acc.checked_add(p))
    }

    /// Decimal representation, normalized (no trailing zeros)
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0 as i64, PRICE_DECIMALS).normalize()
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_normalized() {
        assert_eq!(Price::from_minor(5000).to_string(), "0.005");
        assert_eq!(Price::from_minor(3000).to_string(), "0.003");
        assert_eq!(Price::from_minor(8000).to_string(), "0.008");
        assert_eq!(Price::from_minor(16000).to_string(), "0.016");
    }

    #[test]
    fn test_checked_sum() {
        let total = Price::checked_sum([
            Price::from_minor(5000),
            Price::from_minor(3000),
            Price::from_minor(8000),
        ])
        .unwrap();
        assert_eq!(total, Price::from_minor(16000));
    }

    #[test]
    fn test_overflow_is_explicit() {
        let max = Price::from_minor(u64::MAX);
        assert!(max.checked_add(Price::from_minor(1)).is_err());
    }
}
