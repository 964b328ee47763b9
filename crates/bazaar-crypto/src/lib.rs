//! # bazaar-crypto — Signature Primitives for the Bazaar Settlement Engine
//!
//! Everything the engine needs to answer "did entity X authorize message M":
//!
//! - **Typed data** ([`typed_data`]): EIP-712-style struct hashing and domain
//!   separation. A digest binds the message fields, the protocol name and
//!   version, the chain id and the engine's own address, so a signature
//!   cannot be replayed across exchanges, percentages or deployments.
//!
//! - **Recoverable signatures** ([`signature`]): 65-byte `r ‖ s ‖ v`
//!   signatures with range checks on both scalars, low-S enforcement and a
//!   strict `v ∈ {27, 28}` rule before secp256k1 public-key recovery.
//!
//! - **Verifier** ([`verifier`]): recovers the signer of a typed message and
//!   compares it with the required counterparty.
//!
//! - **Local signer** ([`signer`]): an in-process secp256k1 key used by the
//!   CLI and tests to produce signatures the verifier accepts.

pub mod digest;
pub mod error;
pub mod signature;
pub mod signer;
pub mod typed_data;
pub mod verifier;

// Re-export primary types.
pub use digest::{address_from_verifying_key, keccak256};
pub use error::SignatureError;
pub use signature::{recover_signer, RecoverableSignature};
pub use signer::LocalSigner;
pub use typed_data::{Eip712Domain, MetaTransactionMessage, ResolutionMessage, TypedMessage};
pub use verifier::SignatureVerifier;
