//! # bazaar CLI entry point
//!
//! Parses command-line arguments, installs logging and dispatches to the
//! subcommand handlers in the library.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bazaar_cli::keys::{
    run_address, run_keygen, run_sign_resolution, AddressArgs, KeygenArgs, SignResolutionArgs,
};
use bazaar_cli::simulate::{run_simulate, SimulateArgs};

/// Bazaar settlement engine tooling.
///
/// Replays settlement scenarios against an in-memory engine and produces the
/// keys and signatures the engine verifies.
#[derive(Parser, Debug)]
#[command(name = "bazaar", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a scenario file and print the resulting event log.
    Simulate(SimulateArgs),

    /// Generate a secp256k1 key.
    Keygen(KeygenArgs),

    /// Print the address of a secret key.
    Address(AddressArgs),

    /// Sign a dispute resolution proposal.
    SignResolution(SignResolutionArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    tracing::debug!("bazaar CLI starting");

    let result = match &cli.command {
        Commands::Simulate(args) => run_simulate(args),
        Commands::Keygen(args) => run_keygen(args),
        Commands::Address(args) => run_address(args),
        Commands::SignResolution(args) => run_sign_resolution(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
