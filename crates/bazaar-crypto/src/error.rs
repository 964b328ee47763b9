//! # Signature Error Types
//!
//! Structured errors for signature parsing, recovery and signer comparison.

use bazaar_core::Address;
use thiserror::Error;

/// Errors from signature operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The signature is malformed: wrong length, a scalar outside `[1, n-1]`,
    /// a high `s`, a recovery byte other than 27 or 28, or a point that does
    /// not recover.
    #[error("invalid signature: {reason}")]
    InvalidSignature {
        /// Which check rejected the signature.
        reason: String,
    },

    /// The signature is well-formed but was produced by someone else.
    #[error("signature mismatch: expected signer {expected}, recovered {recovered}")]
    SignatureMismatch {
        /// The identity that was required to sign.
        expected: Address,
        /// The identity that actually signed.
        recovered: Address,
    },

    /// Private key material could not be parsed.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// The signing primitive failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),
}

impl SignatureError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidSignature {
            reason: reason.into(),
        }
    }
}
