//! Cross-crate seams (hexagonal "ports"). Every higher-level crate
//! (`kontext-provenance`, `kontext-compliance`, `kontext-rules`) needs to
//! append an event through the single Logger entry point (C4) without
//! depending on `kontext-engine`, which is the crate that *owns* the Logger
//! and wires the whole façade together. Defining the port here, next to
//! [`crate::event::Event`], breaks what would otherwise be a dependency
//! cycle: `kontext-engine` depends on `kontext-provenance`/`kontext-compliance`/
//! `kontext-rules`, not the other way around.

use async_trait::async_trait;
use thiserror::Error;

use crate::event::PendingEvent;
use crate::event::Event;

/// Errors a logger implementation may reject a pending event with. Distinct
/// from [`crate::error::CoreError`] (which is about canonicalization/chain
/// mechanics) — these are about whether the event is *admissible* at all.
#[derive(Debug, Error)]
pub enum LogRejection {
    #[error("session {session_id} is not active; event rejected")]
    SessionNotActive { session_id: uuid::Uuid },

    #[error("core chain error: {0}")]
    Core(#[from] crate::error::CoreError),
}

/// The single append entry point (C4 Logger), seen from the perspective of
/// any component that needs to chain-and-store an event. Implemented by
/// `kontext-engine::Logger`.
#[async_trait]
pub trait EventLogger: Send + Sync {
    async fn log(&self, pending: PendingEvent) -> Result<Event, LogRejection>;
}
