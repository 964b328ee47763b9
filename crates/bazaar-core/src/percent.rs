//! # Basis Points
//!
//! Fractions of an amount expressed in hundredths of a percent. Used for the
//! buyer's share of a dispute payout and for the escalation deposit rate.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A fraction in `0..=10000` basis points (0%–100%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BasisPoints(u16);

impl BasisPoints {
    /// 100%, in basis points.
    pub const MAX: u16 = 10_000;

    /// 0%.
    pub const ZERO: BasisPoints = BasisPoints(0);

    /// 100%.
    pub const FULL: BasisPoints = BasisPoints(Self::MAX);

    /// Validate and wrap a basis-point value.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidBasisPoints`] for values above 10000.
    pub fn new(value: u32) -> Result<Self, ValidationError> {
        if value > u32::from(Self::MAX) {
            return Err(ValidationError::InvalidBasisPoints(value));
        }
        Ok(Self(value as u16))
    }

    /// The raw basis-point value.
    pub fn value(&self) -> u16 {
        self.0
    }

    /// `amount * self / 10000`, rounded down.
    ///
    /// Computed as quotient and remainder parts so that no intermediate
    /// product can overflow `u128`.
    pub fn apply(&self, amount: u128) -> u128 {
        let bps = u128::from(self.0);
        let max = u128::from(Self::MAX);
        (amount / max) * bps + (amount % max) * bps / max
    }

    /// The remaining share, `10000 - self`.
    pub fn complement(&self) -> BasisPoints {
        BasisPoints(Self::MAX - self.0)
    }
}

impl TryFrom<u32> for BasisPoints {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BasisPoints> for u32 {
    fn from(bps: BasisPoints) -> Self {
        u32::from(bps.0)
    }
}

impl std::fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}bps", self.0)
    }
}
