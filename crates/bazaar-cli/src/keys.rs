//! # Key Subcommands
//!
//! secp256k1 key generation, address derivation and resolution signing.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bazaar_core::{Address, BasisPoints, ExchangeId};
use bazaar_crypto::{Eip712Domain, LocalSigner, ResolutionMessage};
use clap::Args;
use serde::Serialize;

use crate::load_config;

/// Arguments for `bazaar keygen`.
#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Write the secret key to this file instead of printing it.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Arguments for `bazaar address`.
#[derive(Args, Debug)]
pub struct AddressArgs {
    /// Secret key, hex, with or without `0x`.
    #[arg(long)]
    pub key: String,
}

/// Arguments for `bazaar sign-resolution`.
#[derive(Args, Debug)]
pub struct SignResolutionArgs {
    /// Secret key of the signing party, hex.
    #[arg(long)]
    pub key: String,

    /// Exchange under dispute.
    #[arg(long)]
    pub exchange_id: u64,

    /// Proposed buyer share in basis points (0..=10000).
    #[arg(long)]
    pub buyer_percent: u32,

    /// Engine configuration file the signing domain is read from.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the configured chain id.
    #[arg(long)]
    pub chain_id: Option<u64>,

    /// Override the configured engine address.
    #[arg(long)]
    pub protocol_address: Option<Address>,
}

#[derive(Debug, Serialize)]
struct GeneratedKey {
    address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_file: Option<String>,
}

/// A signed resolution, ready to hand to the counterparty.
#[derive(Debug, Serialize)]
pub struct SignedResolution {
    pub signer: Address,
    pub exchange_id: ExchangeId,
    pub buyer_percent: BasisPoints,
    pub domain: Eip712Domain,
    pub signature: String,
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render output")?
    );
    Ok(())
}

/// Execute `bazaar keygen`.
pub fn run_keygen(args: &KeygenArgs) -> Result<u8> {
    let signer = LocalSigner::random();
    let output = match &args.out {
        Some(path) => {
            std::fs::write(path, signer.secret_hex().as_bytes())
                .with_context(|| format!("failed to write key to {}", path.display()))?;
            tracing::info!(address = %signer.address(), path = %path.display(), "key written");
            GeneratedKey {
                address: signer.address(),
                secret: None,
                secret_file: Some(path.display().to_string()),
            }
        }
        None => GeneratedKey {
            address: signer.address(),
            secret: Some(format!("0x{}", signer.secret_hex().as_str())),
            secret_file: None,
        },
    };
    print_json(&output)?;
    Ok(0)
}

/// Execute `bazaar address`.
pub fn run_address(args: &AddressArgs) -> Result<u8> {
    let signer = LocalSigner::from_hex(&args.key).context("invalid secret key")?;
    println!("{}", signer.address());
    Ok(0)
}

/// Build the signed resolution `args` describe.
pub fn sign_resolution(args: &SignResolutionArgs) -> Result<SignedResolution> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(chain_id) = args.chain_id {
        config.chain_id = chain_id;
    }
    if let Some(address) = args.protocol_address {
        config.protocol_address = address;
    }
    let signer = LocalSigner::from_hex(&args.key).context("invalid secret key")?;
    let buyer_percent = BasisPoints::new(args.buyer_percent).context("invalid buyer percent")?;
    let exchange_id = ExchangeId::new(args.exchange_id);
    let domain = config.domain();
    let signature = signer
        .sign_typed(
            &domain,
            &ResolutionMessage {
                exchange_id,
                buyer_percent,
            },
        )
        .context("failed to sign resolution")?;
    tracing::debug!(signer = %signer.address(), exchange_id = %exchange_id, "resolution signed");
    Ok(SignedResolution {
        signer: signer.address(),
        exchange_id,
        buyer_percent,
        domain,
        signature: signature.to_hex(),
    })
}

/// Execute `bazaar sign-resolution`.
pub fn run_sign_resolution(args: &SignResolutionArgs) -> Result<u8> {
    print_json(&sign_resolution(args)?)?;
    Ok(0)
}
