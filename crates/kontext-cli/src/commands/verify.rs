//! `kontext verify` — runs the full verify-and-log pipeline against a
//! candidate transaction: compliance verdict, anomaly evaluation, approval
//! policy check, all chained into the store at `--store`.

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use kontext_engine::TransactionInput;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{commands::open_store, print_error, print_success, print_warning};

#[derive(Args)]
pub struct VerifyArgs {
    #[arg(long, short = 's', value_name = "FILE")]
    store: PathBuf,
    #[arg(long)]
    agent: String,
    #[arg(long)]
    session: Option<Uuid>,
    #[arg(long)]
    chain: String,
    #[arg(long)]
    token: String,
    #[arg(long)]
    amount: Decimal,
    #[arg(long)]
    from: String,
    #[arg(long)]
    to: String,
    #[arg(long, default_value = "")]
    tx_hash: String,
    #[arg(long)]
    project: Option<String>,
}

pub async fn run(args: VerifyArgs) -> anyhow::Result<i32> {
    let kontext = open_store(&args.store).await?;

    let outcome = kontext
        .log_transaction(TransactionInput {
            project_id: args.project.unwrap_or_else(|| "default".into()),
            agent_id: args.agent,
            session_id: args.session,
            tx_hash: if args.tx_hash.is_empty() { format!("cli-{}", Uuid::new_v4()) } else { args.tx_hash },
            chain: args.chain,
            token: args.token,
            amount: args.amount,
            from: args.from,
            to: args.to,
            metadata: serde_json::json!({}),
        })
        .await?;

    kontext.flush().await?;

    println!("{}", "Kontext Verification".bold().cyan());
    println!("{}", "═".repeat(40).cyan());
    println!("  {} {}", "Transaction event:".dimmed(), outcome.event.id);
    println!("  {} {}", "Risk level:".dimmed(), format!("{:?}", outcome.verdict.risk_level).to_lowercase());
    for check in &outcome.verdict.checks {
        let mark = if check.passed { "✓".green() } else { "✗".red() };
        println!("  {mark} {} — {}", check.name, check.description);
    }
    if !outcome.anomalies.is_empty() {
        print_warning(&format!("{} anomaly rule(s) fired", outcome.anomalies.len()));
    }
    if let Some(approval) = &outcome.approval {
        print_warning(&format!("approval required: request {}", approval.request_id));
    }

    if outcome.verdict.compliant {
        print_success("transaction is compliant");
        Ok(0)
    } else {
        print_error("transaction failed compliance verification");
        Ok(1)
    }
}
