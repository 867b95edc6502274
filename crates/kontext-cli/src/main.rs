//! Kontext CLI - thin command-line surface over the compliance audit-trail
//! engine.
//!
//! # Usage
//!
//! ```bash
//! # Run the full verify-and-log pipeline against a candidate transaction
//! kontext verify --store trail.json --agent agent-1 --chain ethereum \
//!     --token USDC --amount 100 --from 0x111... --to 0x222...
//!
//! # Read-only compliance check, no events written
//! kontext check --store trail.json --agent agent-1 --chain ethereum \
//!     --token USDC --amount 100 --from 0x111... --to 0x222...
//!
//! # Look up a sanctions-list reason for an address
//! kontext reason --store trail.json --address 0xabc...
//!
//! # Render a compliance certificate for an agent
//! kontext cert --store trail.json --agent agent-1
//!
//! # Export the audit bundle
//! kontext audit --store trail.json --format json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

mod adapter;
mod commands;

use commands::{audit, cert, check, reason, sync, verify};

/// Kontext - compliance audit trail for autonomous agents moving value on
/// public ledgers.
#[derive(Parser)]
#[command(
    name = "kontext",
    version,
    about = "Kontext CLI - compliance audit trail engine",
    long_about = "Kontext binds every agent action, transaction, reasoning entry,\n\
                  and human attestation into a tamper-evident SHA-256 chain,\n\
                  and evaluates compliance against sanctions, amount, and\n\
                  session-scope rules."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the verify-and-log pipeline against a candidate transaction
    Verify(verify::VerifyArgs),
    /// Read-only compliance check (no events written)
    Check(check::CheckArgs),
    /// Look up a sanctions-list reason for an address
    Reason(reason::ReasonArgs),
    /// Render a compliance certificate for an agent
    Cert(cert::CertArgs),
    /// Export the audit bundle as JSON or CSV
    Audit(audit::AuditArgs),
    /// Explicitly flush or restore the store against its backend file
    Sync(sync::SyncArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Verify(args) => verify::run(args).await?,
        Commands::Check(args) => check::run(args).await?,
        Commands::Reason(args) => reason::run(args).await?,
        Commands::Cert(args) => cert::run(args).await?,
        Commands::Audit(args) => audit::run(args).await?,
        Commands::Sync(args) => sync::run(args).await?,
    };

    std::process::exit(exit_code);
}

fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}

pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}
