//! Amount type
//!
//! Quantities are held in the asset's smallest unit (e.g. wei for an
//! 18-decimal token), so `1e18` is one whole token.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of smallest units in one whole token at 18 decimals
pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

/// A non-negative quantity of a fungible asset in smallest units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub u128);

impl Amount {
    pub fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    /// Whole tokens at 18 decimals
    pub fn tokens(whole: u128) -> Self {
        Self(whole.saturating_mul(ONE_TOKEN))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}
