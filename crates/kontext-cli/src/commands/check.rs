//! `kontext check` — read-only compliance check: runs the same verdict
//! logic as `verify` but never writes an event (spec.md §6 alias).

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use kontext_compliance::VerifyInput;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::commands::open_store;
use crate::{print_error, print_success};

#[derive(Args)]
pub struct CheckArgs {
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
}

pub async fn run(args: CheckArgs) -> anyhow::Result<i32> {
    let kontext = open_store(&args.store).await?;

    let verdict = kontext
        .compliance_check(&VerifyInput {
            agent_id: args.agent,
            session_id: args.session,
            chain: args.chain,
            token: args.token,
            amount: args.amount,
            from: args.from,
            to: args.to,
        })
        .await;

    println!("{}", "Kontext Compliance Check".bold().cyan());
    println!("{}", "═".repeat(40).cyan());
    for check in &verdict.checks {
        let mark = if check.passed { "✓".green() } else { "✗".red() };
        println!("  {mark} {} — {}", check.name, check.description);
    }

    if verdict.compliant {
        print_success("compliant");
        Ok(0)
    } else {
        print_error(&format!("non-compliant (risk: {:?})", verdict.risk_level));
        Ok(1)
    }
}
