//! Façade crate wiring the digest chain, event store, provenance manager,
//! compliance verifier, and rule engines behind a single `Kontext` entry
//! point (spec.md §2).

pub mod config;
pub mod error;
pub mod exporter;
pub mod kontext;
pub mod logger;

pub use config::KontextConfig;
pub use error::EngineError;
pub use exporter::{EventExporter, ExportOutcome, ExportQueue};
pub use kontext::{Kontext, TransactionInput, TransactionOutcome};
pub use logger::{LogInput, Logger};
