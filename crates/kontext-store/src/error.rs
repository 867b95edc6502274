//! Error taxonomy for `kontext-store`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event {event_id} not found")]
    EventNotFound { event_id: Uuid },

    #[error("session {session_id} not found")]
    SessionNotFound { session_id: Uuid },

    #[error("checkpoint {checkpoint_id} not found")]
    CheckpointNotFound { checkpoint_id: Uuid },

    #[error("storage adapter failed during {operation}: {reason}")]
    StorageIo { operation: String, reason: String },

    #[error("restored store contains event {event_id} missing its digest triple")]
    MissingDigestFields { event_id: Uuid },

    #[error("eviction blocked: oldest retained entries have not been flushed yet")]
    EvictionBlocked,

    #[error(transparent)]
    Core(#[from] kontext_core::CoreError),
}
