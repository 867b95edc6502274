//! Error taxonomy for `kontext-provenance`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProvenanceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("session {session_id} not found")]
    SessionNotFound { session_id: Uuid },

    #[error("checkpoint {checkpoint_id} not found")]
    CheckpointNotFound { checkpoint_id: Uuid },

    #[error("session {session_id} is not active")]
    SessionNotActive { session_id: Uuid },

    #[error("checkpoint {checkpoint_id} is not pending")]
    CheckpointNotPending { checkpoint_id: Uuid },

    #[error("checkpoint {checkpoint_id} has expired")]
    CheckpointExpired { checkpoint_id: Uuid },

    #[error("logging failed: {0}")]
    Log(#[from] kontext_core::LogRejection),
}
