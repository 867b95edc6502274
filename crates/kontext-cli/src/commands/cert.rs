//! `kontext cert` — renders a self-attesting compliance certificate for an
//! agent over an optional time range.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use kontext_audit::CertificateRange;

use crate::commands::open_store;
use crate::print_success;

#[derive(Args)]
pub struct CertArgs {
    #[arg(long, short = 's', value_name = "FILE")]
    store: PathBuf,
    #[arg(long)]
    agent: String,
    #[arg(long)]
    since: Option<DateTime<Utc>>,
    #[arg(long)]
    until: Option<DateTime<Utc>>,
    #[arg(long)]
    include_reasoning: bool,
}

pub async fn run(args: CertArgs) -> anyhow::Result<i32> {
    let kontext = open_store(&args.store).await?;

    let certificate = kontext
        .compliance_certificate(
            &args.agent,
            CertificateRange { since: args.since, until: args.until },
            args.include_reasoning,
        )
        .await?;

    println!("{}", "Kontext Compliance Certificate".bold().cyan());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["field", "value"]);
    table
        .add_row(vec!["agent".into(), certificate.agent_id.clone()])
        .add_row(vec!["overall_status".into(), format!("{:?}", certificate.overall_status)])
        .add_row(vec!["trust_score".into(), certificate.trust_score.to_string()])
        .add_row(vec!["actions".into(), certificate.action_count.to_string()])
        .add_row(vec!["transactions".into(), certificate.transaction_count.to_string()])
        .add_row(vec!["anomalies".into(), certificate.anomaly_count.to_string()])
        .add_row(vec!["chain_valid".into(), certificate.chain_valid.to_string()]);
    println!("{table}");

    print_success(&format!("content_hash {}", certificate.content_hash));
    Ok(0)
}
