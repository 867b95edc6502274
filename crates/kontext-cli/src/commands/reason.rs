//! `kontext reason` — looks up why an address is sanctioned, optionally
//! reloading the sanctions list from a JSON file of entries first.

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use kontext_compliance::SanctionsEntry;

use crate::commands::open_store;
use crate::{print_info, print_warning};

#[derive(Args)]
pub struct ReasonArgs {
    #[arg(long, short = 's', value_name = "FILE")]
    store: PathBuf,
    #[arg(long)]
    address: String,
    /// Optional JSON file of sanctions entries to reload before the lookup.
    #[arg(long, value_name = "FILE")]
    sanctions: Option<PathBuf>,
}

pub async fn run(args: ReasonArgs) -> anyhow::Result<i32> {
    let kontext = open_store(&args.store).await?;

    if let Some(path) = args.sanctions {
        let content = std::fs::read_to_string(&path)?;
        let entries: Vec<SanctionsEntry> = serde_json::from_str(&content)?;
        kontext.reload_sanctions(entries);
    }

    match kontext.sanctions_reason(&args.address) {
        Some(reason) => {
            println!("{}", "Sanctions Reason".bold().cyan());
            println!("  {} {}", "Entity:".dimmed(), reason.entity_name);
            println!("  {} {}", "Lists:".dimmed(), reason.lists.join(", "));
            println!("  {} {}", "Source:".dimmed(), reason.source_id);
            print_warning(&format!("{} is sanctioned", args.address));
            Ok(1)
        }
        None => {
            print_info(&format!("{} is not sanctioned", args.address));
            Ok(0)
        }
    }
}
