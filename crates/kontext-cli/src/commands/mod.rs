pub mod audit;
pub mod cert;
pub mod check;
pub mod reason;
pub mod sync;
pub mod verify;

use std::path::PathBuf;
use std::sync::Arc;

use kontext_engine::{config::KontextConfig, Kontext};

use crate::adapter::FileAdapter;

/// Builds a façade over the given store file, restoring whatever state the
/// backend already holds. Every subcommand but `sync restore`-from-scratch
/// goes through this so a fresh process picks up prior runs' events.
pub async fn open_store(path: &PathBuf) -> anyhow::Result<Kontext<FileAdapter>> {
    let backend = Arc::new(FileAdapter::new(path.clone()));
    let kontext = Kontext::new(backend, &KontextConfig::default());
    kontext.restore().await?;
    Ok(kontext)
}
