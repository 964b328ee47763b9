//! # Identity Newtypes
//!
//! Domain-primitive newtypes for the identifiers used throughout the engine.
//!
//! ## Address-based identities
//!
//! Buyers, sellers, dispute resolvers and asset contracts are all identified
//! by a 20-byte [`Address`], the Keccak-derived identity of a secp256k1 key.
//! Using the signing identity directly means a recovered signer can be
//! compared with a party without any lookup table.
//!
//! ## Sequential identifiers
//!
//! [`OfferId`] and [`ExchangeId`] are plain `u64` counters. Exchange ids are
//! assigned by the engine starting at 1; they are never reused.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte account identity.
///
/// Displays and serializes as `0x`-prefixed lowercase hex. Parsing accepts
/// the prefix in either case, or no prefix at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// The all-zero address. Never a valid payout target.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Build an address from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Access the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Left-pad the address into a 32-byte ABI word.
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.len() != 40 {
            return Err(ValidationError::InvalidAddress(s.to_string()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_| ValidationError::InvalidAddress(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// The asset a balance or price is denominated in.
///
/// Wraps the asset contract's address; the zero address denotes the native
/// asset of the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(Address);

impl AssetId {
    /// The native asset.
    pub const NATIVE: AssetId = AssetId(Address::ZERO);

    /// An asset identified by its contract address.
    pub const fn from_address(address: Address) -> Self {
        Self(address)
    }

    /// The asset contract address.
    pub fn as_address(&self) -> &Address {
        &self.0
    }

    /// Whether this is the native asset.
    pub fn is_native(&self) -> bool {
        self.0.is_zero()
    }
}

impl FromStr for AssetId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("native") {
            return Ok(Self::NATIVE);
        }
        s.parse().map(Self)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            write!(f, "native")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Sequential identifiers
// ---------------------------------------------------------------------------

/// Identifier of an offer in the external registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferId(u64);

impl OfferId {
    /// Wrap a raw offer number.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw offer number.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offer:{}", self.0)
    }
}

/// Identifier of an exchange. Assigned by the engine, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(u64);

impl ExchangeId {
    /// Wrap a raw exchange number.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw exchange number.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The identifier following this one.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Encode as a big-endian 32-byte ABI word.
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&self.0.to_be_bytes());
        word
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exchange:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "0x00000000000000000000000000000000000000a1";

    #[test]
    fn address_parse_and_display_roundtrip() {
        let addr: Address = SAMPLE.parse().unwrap();
        assert_eq!(addr.to_string(), SAMPLE);
        assert_eq!(addr.as_bytes()[19], 0xa1);
    }

    #[test]
    fn address_parse_accepts_uppercase_prefix_and_bare_hex() {
        let a: Address = "0X00000000000000000000000000000000000000A1".parse().unwrap();
        let b: Address = "00000000000000000000000000000000000000a1".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn address_parse_rejects_wrong_length() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("".parse::<Address>().is_err());
    }

    #[test]
    fn address_parse_rejects_non_hex() {
        let bad = "0xzz000000000000000000000000000000000000a1";
        assert!(matches!(
            bad.parse::<Address>(),
            Err(ValidationError::InvalidAddress(_))
        ));
    }

    #[test]
    fn zero_address() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::from_bytes([1u8; 20]).is_zero());
        assert_eq!(Address::default(), Address::ZERO);
    }

    #[test]
    fn address_word_is_left_padded() {
        let addr = Address::from_bytes([0xff; 20]);
        let word = addr.to_word();
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(&word[12..], &[0xff; 20]);
    }

    #[test]
    fn address_serializes_as_hex_string() {
        let addr: Address = SAMPLE.parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{SAMPLE}\""));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn address_deserialize_rejects_garbage() {
        assert!(serde_json::from_str::<Address>("\"0xnothex\"").is_err());
    }

    #[test]
    fn native_asset_display_and_parse() {
        assert_eq!(AssetId::NATIVE.to_string(), "native");
        assert_eq!("native".parse::<AssetId>().unwrap(), AssetId::NATIVE);
        let token: AssetId = SAMPLE.parse().unwrap();
        assert!(!token.is_native());
        assert_eq!(token.to_string(), SAMPLE);
    }

    #[test]
    fn exchange_id_word_is_big_endian() {
        let word = ExchangeId::new(0x0102).to_word();
        assert_eq!(word[30], 0x01);
        assert_eq!(word[31], 0x02);
        assert!(word[..24].iter().all(|b| *b == 0));
    }

    #[test]
    fn exchange_id_next_and_display() {
        let id = ExchangeId::new(7);
        assert_eq!(id.next().value(), 8);
        assert_eq!(id.to_string(), "exchange:7");
        assert_eq!(OfferId::new(3).to_string(), "offer:3");
    }

    #[test]
    fn sequential_ids_serialize_transparently() {
        assert_eq!(serde_json::to_string(&ExchangeId::new(42)).unwrap(), "42");
        let offer: OfferId = serde_json::from_str("9").unwrap();
        assert_eq!(offer.value(), 9);
    }
}
