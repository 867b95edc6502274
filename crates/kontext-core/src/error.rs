//! Error taxonomy for `kontext-core`.

use thiserror::Error;

/// Errors surfaced by canonicalization and digest-chain operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to canonicalize event for hashing: {0}")]
    Canonicalize(#[source] serde_json::Error),

    #[error("event type {event_type:?} does not match payload variant")]
    PayloadMismatch { event_type: crate::event::EventType },

    #[error("chain verification failed at sequence {sequence}: {reason}")]
    ChainBroken { sequence: u64, reason: String },

    #[error("restored event {event_id} is missing its digest triple (pre-chain action)")]
    MissingDigestFields { event_id: uuid::Uuid },
}
