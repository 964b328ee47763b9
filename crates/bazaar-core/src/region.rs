//! # Pausable Regions
//!
//! Named feature areas that can be disabled independently as a circuit
//! breaker. Every mutating entry point belongs to exactly one region.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A feature area that can be paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PausableRegion {
    /// Offer lifecycle in the external registry.
    Offers,
    /// Commit, redeem, cancel, revoke, expire, extend, transfer and complete.
    Exchanges,
    /// Every dispute operation.
    Disputes,
    /// Deposits and withdrawals.
    Funds,
    /// Sequential commits on resold vouchers.
    SequentialCommit,
    /// Relayed meta-transactions.
    MetaTransaction,
}

impl PausableRegion {
    /// Every region, in declaration order.
    pub fn all() -> &'static [PausableRegion] {
        &[
            Self::Offers,
            Self::Exchanges,
            Self::Disputes,
            Self::Funds,
            Self::SequentialCommit,
            Self::MetaTransaction,
        ]
    }

    /// The canonical name of this region.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offers => "Offers",
            Self::Exchanges => "Exchanges",
            Self::Disputes => "Disputes",
            Self::Funds => "Funds",
            Self::SequentialCommit => "SequentialCommit",
            Self::MetaTransaction => "MetaTransaction",
        }
    }
}

impl std::fmt::Display for PausableRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PausableRegion {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|region| region.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownRegion(s.to_string()))
    }
}
