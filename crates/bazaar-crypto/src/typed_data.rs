//! # Typed Structured Data
//!
//! EIP-712-style hashing. A signed digest is
//!
//! ```text
//! keccak256(0x19 ‖ 0x01 ‖ domain_separator ‖ struct_hash)
//! ```
//!
//! where the domain separator commits to the protocol name, version, chain
//! id and the verifying engine's address, and the struct hash commits to the
//! message type string and each field encoded as a 32-byte word. Dynamic
//! fields (`string`, `bytes`) are encoded as the Keccak-256 of their
//! contents.

use bazaar_core::{Address, BasisPoints, ExchangeId};
use serde::{Deserialize, Serialize};

use crate::digest::{keccak256, keccak256_concat};

/// Type string of the domain struct.
pub const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Type string of a dispute resolution.
pub const RESOLUTION_TYPE: &str = "Resolution(uint256 exchangeId,uint256 buyerPercentBasisPoints)";

/// Type string of a relayed call.
pub const META_TRANSACTION_TYPE: &str =
    "MetaTransaction(uint256 nonce,address from,string functionName,bytes32 payloadHash)";

/// Encode an unsigned integer as a big-endian 32-byte word.
pub fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// The signing domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Domain {
    /// Protocol name.
    pub name: String,
    /// Protocol version.
    pub version: String,
    /// Chain the deployment lives on.
    pub chain_id: u64,
    /// Address of the engine that verifies the signature.
    pub verifying_contract: Address,
}

impl Eip712Domain {
    /// Build a domain.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        chain_id: u64,
        verifying_contract: Address,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            chain_id,
            verifying_contract,
        }
    }

    /// The domain separator.
    pub fn separator(&self) -> [u8; 32] {
        keccak256_concat(&[
            &keccak256(DOMAIN_TYPE.as_bytes()),
            &keccak256(self.name.as_bytes()),
            &keccak256(self.version.as_bytes()),
            &uint_word(u128::from(self.chain_id)),
            &self.verifying_contract.to_word(),
        ])
    }
}

/// A message that can be hashed as typed structured data.
pub trait TypedMessage {
    /// The canonical type string, e.g. `Resolution(uint256 exchangeId,...)`.
    fn type_string(&self) -> &'static str;

    /// Each field encoded as one 32-byte word, in type-string order.
    fn encode_fields(&self) -> Vec<[u8; 32]>;

    /// `keccak256(typeHash ‖ encodeData(message))`.
    fn struct_hash(&self) -> [u8; 32] {
        let type_hash = keccak256(self.type_string().as_bytes());
        let fields = self.encode_fields();
        let mut parts: Vec<&[u8]> = Vec::with_capacity(fields.len() + 1);
        parts.push(&type_hash);
        parts.extend(fields.iter().map(|word| &word[..]));
        keccak256_concat(&parts)
    }
}

/// Final signing digest of `message` under `domain_separator`.
pub fn typed_digest(domain_separator: &[u8; 32], message: &dyn TypedMessage) -> [u8; 32] {
    keccak256_concat(&[&[0x19, 0x01], domain_separator, &message.struct_hash()])
}

/// A proposed settlement of a dispute: the buyer's share of the pot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionMessage {
    /// Disputed exchange.
    pub exchange_id: ExchangeId,
    /// Buyer's share, in basis points.
    pub buyer_percent: BasisPoints,
}

impl TypedMessage for ResolutionMessage {
    fn type_string(&self) -> &'static str {
        RESOLUTION_TYPE
    }

    fn encode_fields(&self) -> Vec<[u8; 32]> {
        vec![
            self.exchange_id.to_word(),
            uint_word(u128::from(self.buyer_percent.value())),
        ]
    }
}

/// A call relayed on behalf of `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTransactionMessage {
    /// Per-signer replay nonce.
    pub nonce: u64,
    /// The signer, who becomes the caller of the relayed operation.
    pub from: Address,
    /// Name of the relayed operation.
    pub function_name: String,
    /// Keccak-256 of the call's canonical encoding.
    pub payload_hash: [u8; 32],
}

impl TypedMessage for MetaTransactionMessage {
    fn type_string(&self) -> &'static str {
        META_TRANSACTION_TYPE
    }

    fn encode_fields(&self) -> Vec<[u8; 32]> {
        vec![
            uint_word(u128::from(self.nonce)),
            self.from.to_word(),
            keccak256(self.function_name.as_bytes()),
            self.payload_hash,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Eip712Domain {
        Eip712Domain::new("Bazaar", "V1", 1, Address::from_bytes([0xAB; 20]))
    }

    fn resolution(id: u64, bps: u32) -> ResolutionMessage {
        ResolutionMessage {
            exchange_id: ExchangeId::new(id),
            buyer_percent: BasisPoints::new(bps).unwrap(),
        }
    }

    #[test]
    fn uint_word_is_big_endian() {
        let word = uint_word(0x0102);
        assert_eq!(word[30], 0x01);
        assert_eq!(word[31], 0x02);
        assert!(word[..16].iter().all(|b| *b == 0));
    }

    #[test]
    fn separator_binds_every_domain_field() {
        let base = domain().separator();
        let mut d = domain();
        d.name = "Other".into();
        assert_ne!(d.separator(), base);
        let mut d = domain();
        d.version = "V2".into();
        assert_ne!(d.separator(), base);
        let mut d = domain();
        d.chain_id = 5;
        assert_ne!(d.separator(), base);
        let mut d = domain();
        d.verifying_contract = Address::from_bytes([0xCD; 20]);
        assert_ne!(d.separator(), base);
    }

    #[test]
    fn resolution_hash_binds_exchange_and_percent() {
        let base = resolution(1, 6000).struct_hash();
        assert_ne!(resolution(2, 6000).struct_hash(), base);
        assert_ne!(resolution(1, 6001).struct_hash(), base);
        assert_eq!(resolution(1, 6000).struct_hash(), base);
    }

    #[test]
    fn digest_is_deterministic_and_domain_bound() {
        let sep = domain().separator();
        let msg = resolution(1, 6000);
        assert_eq!(typed_digest(&sep, &msg), typed_digest(&sep, &msg));
        let other = Eip712Domain::new("Bazaar", "V1", 2, Address::from_bytes([0xAB; 20]));
        assert_ne!(typed_digest(&sep, &msg), typed_digest(&other.separator(), &msg));
    }

    #[test]
    fn meta_transaction_hash_binds_function_name() {
        let msg = MetaTransactionMessage {
            nonce: 1,
            from: Address::from_bytes([1; 20]),
            function_name: "commit".into(),
            payload_hash: keccak256(b"{}"),
        };
        let mut renamed = msg.clone();
        renamed.function_name = "withdraw_funds".into();
        assert_ne!(msg.struct_hash(), renamed.struct_hash());
        let mut renonced = msg.clone();
        renonced.nonce = 2;
        assert_ne!(msg.struct_hash(), renonced.struct_hash());
    }

    #[test]
    fn resolution_and_meta_types_never_collide() {
        assert_ne!(
            keccak256(RESOLUTION_TYPE.as_bytes()),
            keccak256(META_TRANSACTION_TYPE.as_bytes())
        );
    }
}
