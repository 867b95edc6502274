//! `kontext audit` — exports the audit bundle as JSON or CSV, to stdout or
//! an `--out` file.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use colored::Colorize;
use kontext_audit::{ExportFilters, ExportFormat};
use kontext_core::EventType;

use crate::commands::open_store;
use crate::print_success;

#[derive(Copy, Clone, ValueEnum)]
pub enum Format {
    Json,
    Csv,
}

#[derive(Args)]
pub struct AuditArgs {
    #[arg(long, short = 's', value_name = "FILE")]
    store: PathBuf,
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,
    #[arg(long)]
    agent: Option<String>,
    #[arg(long, value_name = "EVENT_TYPE")]
    event_type: Option<String>,
    #[arg(long)]
    since: Option<DateTime<Utc>>,
    #[arg(long)]
    until: Option<DateTime<Utc>>,
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
}

fn parse_event_type(raw: &str) -> anyhow::Result<EventType> {
    let json = serde_json::Value::String(raw.to_string());
    Ok(serde_json::from_value(json)?)
}

pub async fn run(args: AuditArgs) -> anyhow::Result<i32> {
    let kontext = open_store(&args.store).await?;

    let filters = ExportFilters {
        agent_id: args.agent,
        event_type: args.event_type.as_deref().map(parse_event_type).transpose()?,
        since: args.since,
        until: args.until,
    };
    let format = match args.format {
        Format::Json => ExportFormat::Json,
        Format::Csv => ExportFormat::Csv,
    };

    let export = kontext.export(format, filters).await?;
    let rendered = match &export.data {
        serde_json::Value::String(csv) => csv.clone(),
        value => serde_json::to_string_pretty(value)?,
    };

    match args.out {
        Some(path) => {
            std::fs::write(&path, &rendered)?;
            print_success(&format!("wrote {} record(s) to {}", export.record_count, path.display()));
        }
        None => println!("{rendered}"),
    }

    println!("{}", format!("terminal digest: {}", export.terminal_digest).dimmed());
    Ok(0)
}
