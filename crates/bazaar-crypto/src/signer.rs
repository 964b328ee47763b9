//! # Local Signer
//!
//! An in-process secp256k1 key. The engine never signs anything; the CLI and
//! the test suites use this to act as buyers, sellers and resolvers.

use std::fmt;

use bazaar_core::Address;
use k256::ecdsa::{RecoveryId, SigningKey};
use rand_core::OsRng;
use zeroize::Zeroizing;

use crate::digest::address_from_verifying_key;
use crate::error::SignatureError;
use crate::signature::RecoverableSignature;
use crate::typed_data::{typed_digest, Eip712Domain, TypedMessage};

/// A secp256k1 signing key.
///
/// `Debug` prints only the address; the secret never leaves the struct
/// except through [`LocalSigner::secret_hex`].
#[derive(Clone)]
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    /// Load a key from its 32-byte big-endian scalar.
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, SignatureError> {
        let key = SigningKey::from_slice(secret)
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
        Ok(Self::from_key(key))
    }

    /// Load a key from hex, with or without a `0x` prefix.
    pub fn from_hex(secret: &str) -> Result<Self, SignatureError> {
        let trimmed = secret.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let decoded = Zeroizing::new(
            hex::decode(digits).map_err(|e| SignatureError::InvalidKey(e.to_string()))?,
        );
        if decoded.len() != 32 {
            return Err(SignatureError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                decoded.len()
            )));
        }
        let key = SigningKey::from_slice(&decoded)
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
        Ok(Self::from_key(key))
    }

    /// A fresh key from the operating system's RNG.
    pub fn random() -> Self {
        Self::from_key(SigningKey::random(&mut OsRng))
    }

    fn from_key(key: SigningKey) -> Self {
        let address = address_from_verifying_key(key.verifying_key());
        Self { key, address }
    }

    /// The address this key signs as.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Hex of the secret scalar. Zeroized on drop.
    pub fn secret_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.key.to_bytes()))
    }

    /// Sign a 32-byte digest, producing a low-S signature with `v` of 27 or 28.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<RecoverableSignature, SignatureError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| SignatureError::SigningFailed(e.to_string()))?;
        match signature.normalize_s() {
            Some(normalized) => {
                let flipped =
                    RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
                Ok(RecoverableSignature::from_parts(&normalized, flipped))
            }
            None => Ok(RecoverableSignature::from_parts(&signature, recovery_id)),
        }
    }

    /// Sign `message` under `domain`.
    pub fn sign_typed(
        &self,
        domain: &Eip712Domain,
        message: &dyn TypedMessage,
    ) -> Result<RecoverableSignature, SignatureError> {
        self.sign_digest(&typed_digest(&domain.separator(), message))
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
