//! # Keccak Digests
//!
//! Keccak-256 and the public-key-to-address derivation used by every
//! signature check.

use bazaar_core::Address;
use k256::ecdsa::VerifyingKey;
use sha3::{Digest, Keccak256};

/// Keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Keccak-256 over several slices, without concatenating them first.
pub(crate) fn keccak256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// The address of a secp256k1 public key: the last 20 bytes of the
/// Keccak-256 of the uncompressed point without its `0x04` prefix.
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn concat_matches_single_buffer() {
        let joined = keccak256(b"hello world");
        let parts = keccak256_concat(&[b"hello", b" ", b"world"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn address_of_known_key() {
        // Private key 1 maps to the well-known generator-point address.
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let key = k256::ecdsa::SigningKey::from_slice(&secret).unwrap();
        let addr = address_from_verifying_key(key.verifying_key());
        assert_eq!(
            addr.to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }
}
