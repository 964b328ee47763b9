//! # Recoverable secp256k1 Signatures
//!
//! A 65-byte `r ‖ s ‖ v` signature and the checks that run before public-key
//! recovery:
//!
//! - `r` and `s` must both lie in `[1, n-1]`, where `n` is the curve order.
//! - `s` must be in the lower half of the order. This removes the second,
//!   equally valid `(r, n - s)` encoding of every signature.
//! - `v` must be exactly 27 or 28.
//!
//! Range comparisons run in constant time with `subtle`.

use std::fmt;
use std::str::FromStr;

use bazaar_core::Address;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::{Choice, ConstantTimeEq, ConstantTimeGreater, ConstantTimeLess};

use crate::digest::address_from_verifying_key;
use crate::error::SignatureError;

/// Order `n` of the secp256k1 group, big-endian.
const SECP256K1_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// `n / 2`, rounded down. A low `s` is strictly below this bound plus one.
const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

/// Offset added to the recovery id to form `v`.
const V_OFFSET: u8 = 27;

/// Length of the wire encoding.
pub const SIGNATURE_LENGTH: usize = 65;

/// A recoverable ECDSA signature over secp256k1.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecoverableSignature {
    /// The `r` scalar, big-endian.
    pub r: [u8; 32],
    /// The `s` scalar, big-endian.
    pub s: [u8; 32],
    /// Recovery byte, 27 or 28 for a valid signature.
    pub v: u8,
}

impl RecoverableSignature {
    /// Parse the 65-byte `r ‖ s ‖ v` encoding.
    ///
    /// Only the length is checked here; scalar and `v` validation happen in
    /// [`recover_signer`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(SignatureError::invalid(format!(
                "expected {SIGNATURE_LENGTH} bytes, got {}",
                bytes.len()
            )));
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v: bytes[64] })
    }

    /// The 65-byte `r ‖ s ‖ v` encoding.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    /// `0x`-prefixed hex of the wire encoding.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    pub(crate) fn from_parts(signature: &Signature, recovery_id: RecoveryId) -> Self {
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Self {
            r,
            s,
            v: recovery_id.to_byte() + V_OFFSET,
        }
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecoverableSignature")
            .field(&self.to_hex())
            .finish()
    }
}

impl fmt::Display for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for RecoverableSignature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits)
            .map_err(|e| SignatureError::invalid(format!("not hex: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for RecoverableSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RecoverableSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ── Constant-time range checks ───────────────────────────────────────

/// Big-endian `a < b`, without branching on the data.
fn ct_less_than(a: &[u8; 32], b: &[u8; 32]) -> Choice {
    let mut less = Choice::from(0);
    let mut decided = Choice::from(0);
    for (x, y) in a.iter().zip(b.iter()) {
        less |= !decided & x.ct_lt(y);
        decided |= x.ct_gt(y) | x.ct_lt(y);
    }
    less
}

/// `0 < scalar < n`.
fn is_valid_scalar(scalar: &[u8; 32]) -> bool {
    let zero = scalar[..].ct_eq(&[0u8; 32][..]);
    bool::from(!zero & ct_less_than(scalar, &SECP256K1_ORDER))
}

/// `s <= n / 2`.
fn is_low_s(s: &[u8; 32]) -> bool {
    bool::from(!ct_less_than(&SECP256K1_HALF_ORDER, s))
}

/// Recover the address that produced `signature` over `prehash`.
///
/// # Errors
///
/// [`SignatureError::InvalidSignature`] if any range check fails or the
/// signature does not correspond to a curve point.
pub fn recover_signer(
    prehash: &[u8; 32],
    signature: &RecoverableSignature,
) -> Result<Address, SignatureError> {
    if !is_valid_scalar(&signature.r) {
        return Err(SignatureError::invalid("r is outside [1, n-1]"));
    }
    if !is_valid_scalar(&signature.s) {
        return Err(SignatureError::invalid("s is outside [1, n-1]"));
    }
    if !is_low_s(&signature.s) {
        return Err(SignatureError::invalid("s is in the upper half of the curve order"));
    }
    let recovery_byte = match signature.v {
        27 | 28 => signature.v - V_OFFSET,
        other => {
            return Err(SignatureError::invalid(format!(
                "v must be 27 or 28, got {other}"
            )))
        }
    };
    let recovery_id = RecoveryId::from_byte(recovery_byte)
        .ok_or_else(|| SignatureError::invalid("unusable recovery id"))?;

    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(&signature.r);
    rs[32..].copy_from_slice(&signature.s);
    let parsed = Signature::from_slice(&rs)
        .map_err(|e| SignatureError::invalid(format!("malformed scalars: {e}")))?;

    let key = VerifyingKey::recover_from_prehash(prehash, &parsed, recovery_id)
        .map_err(|e| SignatureError::invalid(format!("recovery failed: {e}")))?;
    Ok(address_from_verifying_key(&key))
}
