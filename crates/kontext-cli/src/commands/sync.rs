//! `kontext sync` — explicit flush or restore against the store's backend
//! file (spec.md §1 Non-goal (c): "real-time streaming — flush is
//! explicit").

use std::path::PathBuf;

use clap::{Args, ValueEnum};

use crate::commands::open_store;
use crate::print_success;

#[derive(Copy, Clone, ValueEnum)]
pub enum Direction {
    Flush,
    Restore,
}

#[derive(Args)]
pub struct SyncArgs {
    #[arg(long, short = 's', value_name = "FILE")]
    store: PathBuf,
    #[arg(long, value_enum, default_value_t = Direction::Flush)]
    direction: Direction,
}

pub async fn run(args: SyncArgs) -> anyhow::Result<i32> {
    let kontext = open_store(&args.store).await?;

    match args.direction {
        Direction::Flush => {
            kontext.flush().await?;
            print_success("flushed in-memory store to backend");
        }
        Direction::Restore => {
            // open_store() above already restored; this branch exists so
            // `sync --direction restore` is an explicit, nameable operation
            // rather than an implicit side effect of every command.
            print_success("restored store from backend");
        }
    }
    Ok(0)
}
