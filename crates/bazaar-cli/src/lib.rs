//! # bazaar-cli — Command-Line Tooling for the Settlement Engine
//!
//! Provides the `bazaar` binary.
//!
//! ## Subcommands
//!
//! - `bazaar simulate <scenario.yaml>`: Replay a scripted scenario against an
//!   in-memory engine and print the event log as JSON.
//! - `bazaar keygen`: Generate a secp256k1 key.
//! - `bazaar address --key <hex>`: Derive the address of a key.
//! - `bazaar sign-resolution`: Sign a dispute resolution proposal.
//!
//! ```bash
//! bazaar simulate crates/bazaar-cli/scenarios/mutual_resolution.yaml
//! bazaar sign-resolution --key 0x22.. --exchange-id 1 --buyer-percent 6000 --config bazaar.yaml
//! ```

pub mod keys;
pub mod simulate;

use std::path::Path;

use anyhow::{Context, Result};
use bazaar_settlement::SettlementConfig;

/// Load the engine configuration from `path`, or defaults when absent.
pub fn load_config(path: Option<&Path>) -> Result<SettlementConfig> {
    match path {
        Some(path) => SettlementConfig::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(SettlementConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_path_uses_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config, SettlementConfig::default());
    }

    #[test]
    fn config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bazaar.yaml");
        std::fs::write(&path, "chain_id: 5\nprotocol_name: Test Market\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.chain_id, 5);
        assert_eq!(config.protocol_name, "Test Market");
    }

    #[test]
    fn unreadable_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yaml");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("missing.yaml"));
    }
}
