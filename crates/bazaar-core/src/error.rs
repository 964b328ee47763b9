//! # Validation Errors
//!
//! Errors raised when a domain primitive is constructed from untrusted
//! input. Each variant carries the rejected input so that operators can
//! diagnose misconfiguration without guesswork.

use thiserror::Error;

/// Validation errors for domain primitive newtypes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Address is not 20 bytes of hex with an optional `0x` prefix.
    #[error("invalid address: \"{0}\" (expected 0x followed by 40 hex characters)")]
    InvalidAddress(String),

    /// Basis-point value exceeds 10000 (100%).
    #[error("invalid basis points: {0} (must be between 0 and 10000)")]
    InvalidBasisPoints(u32),

    /// Timestamp is outside the representable UTC range.
    #[error("invalid timestamp: \"{value}\" ({reason})")]
    InvalidTimestamp {
        /// The value that failed to convert.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Region name does not match any known pausable region.
    #[error("unknown pausable region: \"{0}\"")]
    UnknownRegion(String),
}
