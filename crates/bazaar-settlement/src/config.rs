//! # Engine Configuration
//!
//! [`SettlementConfig`] holds the protocol-wide parameters. Every field has
//! a default, so a YAML document only needs to name what it overrides.
//!
//! Sources, in order of convenience:
//!
//! - [`SettlementConfig::from_yaml_str`] / [`SettlementConfig::from_path`]
//! - [`SettlementConfig::from_env`], which overlays these variables on the
//!   defaults:
//!   - `BAZAAR_CHAIN_ID`
//!   - `BAZAAR_PROTOCOL_ADDRESS`
//!   - `BAZAAR_PAUSER`
//!   - `BAZAAR_ESCALATION_DEPOSIT_BPS`
//!   - `BAZAAR_MAX_WITHDRAWAL_TOKENS`
//!
//! Every loader validates before returning.

use std::path::Path;

use bazaar_core::{Address, BasisPoints, PausableRegion};
use bazaar_crypto::Eip712Domain;
use serde::{Deserialize, Serialize};

use crate::relay::EngineCall;

/// How the pot is split when an escalated dispute is refused or its
/// resolver lets the deadline pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RefusalPolicy {
    /// Buyer gets the price back, seller gets the deposit back.
    #[default]
    RefundAll,
    /// Seller keeps price and deposit.
    SellerKeepsAll,
    /// Split the pot as if resolved at `buyer_percent`.
    Split {
        /// Buyer's share of price plus deposit.
        buyer_percent: BasisPoints,
    },
}

/// Protocol-wide parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Name bound into every signing domain.
    pub protocol_name: String,
    /// Version bound into every signing domain.
    pub protocol_version: String,
    /// Chain the deployment lives on.
    pub chain_id: u64,
    /// The engine's own address, bound into every signing domain.
    pub protocol_address: Address,
    /// The only identity allowed to pause and unpause regions.
    pub pauser: Address,
    /// Share of the resolver fee the buyer deposits on escalation.
    pub buyer_escalation_deposit_bps: BasisPoints,
    /// Most assets in a single withdrawal.
    pub max_tokens_per_withdrawal: usize,
    /// Payout on refusal or lapse of an escalated dispute.
    pub refusal_policy: RefusalPolicy,
    /// Regions paused at start-up.
    pub paused_regions: Vec<PausableRegion>,
    /// Operations that may be relayed as meta-transactions.
    pub relay_allowlist: Vec<String>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            protocol_name: "Bazaar Protocol".to_string(),
            protocol_version: "V1".to_string(),
            chain_id: 1,
            protocol_address: Address::ZERO,
            pauser: Address::ZERO,
            buyer_escalation_deposit_bps: BasisPoints::new(1_000).unwrap_or(BasisPoints::ZERO),
            max_tokens_per_withdrawal: 100,
            refusal_policy: RefusalPolicy::default(),
            paused_regions: Vec::new(),
            relay_allowlist: EngineCall::FUNCTION_NAMES
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
        }
    }
}

impl SettlementConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Defaults overlaid with the `BAZAAR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = lookup("BAZAAR_CHAIN_ID") {
            config.chain_id = parse_var("BAZAAR_CHAIN_ID", &raw)?;
        }
        if let Some(raw) = lookup("BAZAAR_PROTOCOL_ADDRESS") {
            config.protocol_address = parse_var("BAZAAR_PROTOCOL_ADDRESS", &raw)?;
        }
        if let Some(raw) = lookup("BAZAAR_PAUSER") {
            config.pauser = parse_var("BAZAAR_PAUSER", &raw)?;
        }
        if let Some(raw) = lookup("BAZAAR_ESCALATION_DEPOSIT_BPS") {
            let value: u32 = parse_var("BAZAAR_ESCALATION_DEPOSIT_BPS", &raw)?;
            config.buyer_escalation_deposit_bps =
                BasisPoints::new(value).map_err(|e| ConfigError::InvalidEnv {
                    var: "BAZAAR_ESCALATION_DEPOSIT_BPS".to_string(),
                    reason: e.to_string(),
                })?;
        }
        if let Some(raw) = lookup("BAZAAR_MAX_WITHDRAWAL_TOKENS") {
            config.max_tokens_per_withdrawal = parse_var("BAZAAR_MAX_WITHDRAWAL_TOKENS", &raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "protocol_name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.protocol_version.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "protocol_version",
                reason: "must not be empty".to_string(),
            });
        }
        if self.chain_id == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chain_id",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.max_tokens_per_withdrawal == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_tokens_per_withdrawal",
                reason: "must allow at least one asset".to_string(),
            });
        }
        if let Some(unknown) = self
            .relay_allowlist
            .iter()
            .find(|name| !EngineCall::FUNCTION_NAMES.contains(&name.as_str()))
        {
            return Err(ConfigError::InvalidValue {
                field: "relay_allowlist",
                reason: format!("unknown function {unknown}"),
            });
        }
        Ok(())
    }

    /// The signing domain of this deployment.
    pub fn domain(&self) -> Eip712Domain {
        Eip712Domain::new(
            self.protocol_name.clone(),
            self.protocol_version.clone(),
            self.chain_id,
            self.protocol_address,
        )
    }
}

fn parse_var<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config {path}: {reason}")]
    Io {
        /// File path.
        path: String,
        /// OS error.
        reason: String,
    },
    /// The document is not valid YAML for this schema.
    #[error("invalid config document: {0}")]
    Parse(String),
    /// An environment variable could not be parsed.
    #[error("invalid value for {var}: {reason}")]
    InvalidEnv {
        /// Variable name.
        var: String,
        /// Parse failure.
        reason: String,
    },
    /// A field violates a constraint.
    #[error("invalid config field {field}: {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Constraint.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = SettlementConfig::default();
        config.validate().unwrap();
        assert_eq!(config.buyer_escalation_deposit_bps.value(), 1_000);
        assert_eq!(config.max_tokens_per_withdrawal, 100);
        assert_eq!(config.refusal_policy, RefusalPolicy::RefundAll);
        assert!(config.relay_allowlist.iter().any(|f| f == "commit"));
    }

    #[test]
    fn yaml_overrides_only_named_fields() {
        let config = SettlementConfig::from_yaml_str(
            "chain_id: 31337\nrefusal_policy:\n  policy: split\n  buyer_percent: 2500\npaused_regions: [Funds]\n",
        )
        .unwrap();
        assert_eq!(config.chain_id, 31337);
        assert_eq!(
            config.refusal_policy,
            RefusalPolicy::Split {
                buyer_percent: BasisPoints::new(2_500).unwrap()
            }
        );
        assert_eq!(config.paused_regions, vec![PausableRegion::Funds]);
        assert_eq!(config.protocol_version, "V1");
    }

    #[test]
    fn yaml_rejects_out_of_range_bps() {
        let err = SettlementConfig::from_yaml_str("buyer_escalation_deposit_bps: 10001\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn yaml_rejects_unknown_allowlist_entry() {
        let err = SettlementConfig::from_yaml_str("relay_allowlist: [commit, self_destruct]\n")
            .unwrap_err();
        assert!(err.to_string().contains("self_destruct"));
    }

    #[test]
    fn zero_chain_id_is_rejected() {
        let err = SettlementConfig::from_yaml_str("chain_id: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "chain_id", .. }));
    }

    #[test]
    fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bazaar.yaml");
        std::fs::write(&path, "max_tokens_per_withdrawal: 3\n").unwrap();
        let config = SettlementConfig::from_path(&path).unwrap();
        assert_eq!(config.max_tokens_per_withdrawal, 3);
    }

    #[test]
    fn from_path_reports_missing_file() {
        let err = SettlementConfig::from_path("/nonexistent/bazaar.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn env_overlay() {
        let config = SettlementConfig::from_lookup(lookup(&[
            ("BAZAAR_CHAIN_ID", "5"),
            ("BAZAAR_PAUSER", "0x00000000000000000000000000000000000000aa"),
            ("BAZAAR_ESCALATION_DEPOSIT_BPS", "500"),
            ("BAZAAR_MAX_WITHDRAWAL_TOKENS", "7"),
        ]))
        .unwrap();
        assert_eq!(config.chain_id, 5);
        assert_eq!(config.pauser.as_bytes()[19], 0xaa);
        assert_eq!(config.buyer_escalation_deposit_bps.value(), 500);
        assert_eq!(config.max_tokens_per_withdrawal, 7);
    }

    #[test]
    fn env_rejects_garbage() {
        let err = SettlementConfig::from_lookup(lookup(&[("BAZAAR_CHAIN_ID", "mainnet")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref var, .. } if var == "BAZAAR_CHAIN_ID"));

        let err = SettlementConfig::from_lookup(lookup(&[(
            "BAZAAR_ESCALATION_DEPOSIT_BPS",
            "20000",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("BAZAAR_ESCALATION_DEPOSIT_BPS"));
    }

    #[test]
    fn domain_binds_config() {
        let config = SettlementConfig {
            chain_id: 9,
            protocol_address: Address::from_bytes([7; 20]),
            ..SettlementConfig::default()
        };
        let domain = config.domain();
        assert_eq!(domain.chain_id, 9);
        assert_eq!(domain.verifying_contract, Address::from_bytes([7; 20]));
        assert_eq!(domain.name, "Bazaar Protocol");
    }
}
