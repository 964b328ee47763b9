//! # Signature Verifier
//!
//! Binds a signing domain and answers "was this typed message signed by
//! that address". The domain separator is computed once at construction.

use bazaar_core::Address;

use crate::error::SignatureError;
use crate::signature::{recover_signer, RecoverableSignature};
use crate::typed_data::{typed_digest, Eip712Domain, TypedMessage};

/// Verifies typed-data signatures for one deployment.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    domain: Eip712Domain,
    separator: [u8; 32],
}

impl SignatureVerifier {
    /// Create a verifier for `domain`.
    pub fn new(domain: Eip712Domain) -> Self {
        let separator = domain.separator();
        Self { domain, separator }
    }

    /// The signing domain.
    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    /// The precomputed domain separator.
    pub fn separator(&self) -> [u8; 32] {
        self.separator
    }

    /// The digest a signer must sign for `message`.
    pub fn digest(&self, message: &dyn TypedMessage) -> [u8; 32] {
        typed_digest(&self.separator, message)
    }

    /// Recover the signer of `message`.
    pub fn recover(
        &self,
        message: &dyn TypedMessage,
        signature: &RecoverableSignature,
    ) -> Result<Address, SignatureError> {
        recover_signer(&self.digest(message), signature)
    }

    /// Require that `expected` signed `message`.
    ///
    /// # Errors
    ///
    /// [`SignatureError::InvalidSignature`] for a malformed signature and
    /// [`SignatureError::SignatureMismatch`] when someone else signed.
    pub fn verify(
        &self,
        message: &dyn TypedMessage,
        signature: &RecoverableSignature,
        expected: &Address,
    ) -> Result<(), SignatureError> {
        let recovered = self.recover(message, signature)?;
        if recovered != *expected {
            tracing::warn!(
                expected = %expected,
                recovered = %recovered,
                type_string = message.type_string(),
                "signature recovered to an unexpected signer"
            );
            return Err(SignatureError::SignatureMismatch {
                expected: *expected,
                recovered,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::LocalSigner;
    use crate::typed_data::ResolutionMessage;
    use bazaar_core::{BasisPoints, ExchangeId};

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(Eip712Domain::new(
            "Bazaar",
            "V1",
            31337,
            Address::from_bytes([0x42; 20]),
        ))
    }

    fn resolution(id: u64, bps: u32) -> ResolutionMessage {
        ResolutionMessage {
            exchange_id: ExchangeId::new(id),
            buyer_percent: BasisPoints::new(bps).unwrap(),
        }
    }

    #[test]
    fn accepts_expected_signer() {
        let v = verifier();
        let seller = LocalSigner::random();
        let msg = resolution(1, 6000);
        let sig = seller.sign_typed(v.domain(), &msg).unwrap();
        v.verify(&msg, &sig, &seller.address()).unwrap();
    }

    #[test]
    fn rejects_other_signer_with_mismatch() {
        let v = verifier();
        let seller = LocalSigner::random();
        let mallory = LocalSigner::random();
        let msg = resolution(1, 6000);
        let sig = mallory.sign_typed(v.domain(), &msg).unwrap();
        let err = v.verify(&msg, &sig, &seller.address()).unwrap_err();
        assert_eq!(
            err,
            SignatureError::SignatureMismatch {
                expected: seller.address(),
                recovered: mallory.address(),
            }
        );
    }

    #[test]
    fn signature_does_not_transfer_between_percentages() {
        let v = verifier();
        let seller = LocalSigner::random();
        let sig = seller.sign_typed(v.domain(), &resolution(1, 6000)).unwrap();
        assert!(v.verify(&resolution(1, 10_000), &sig, &seller.address()).is_err());
        assert!(v.verify(&resolution(2, 6000), &sig, &seller.address()).is_err());
    }

    #[test]
    fn signature_does_not_transfer_between_deployments() {
        let v = verifier();
        let other = SignatureVerifier::new(Eip712Domain::new(
            "Bazaar",
            "V1",
            31337,
            Address::from_bytes([0x43; 20]),
        ));
        let seller = LocalSigner::random();
        let msg = resolution(1, 6000);
        let sig = seller.sign_typed(v.domain(), &msg).unwrap();
        assert!(other.verify(&msg, &sig, &seller.address()).is_err());
    }

    #[test]
    fn separator_is_cached() {
        let v = verifier();
        assert_eq!(v.separator(), v.domain().separator());
    }
}
