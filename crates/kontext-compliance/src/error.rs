use thiserror::Error;

/// The verifier and trust scorer are pure functions over already-loaded
/// state; this error exists for the one failure mode that does cross a
/// storage boundary (a referenced session or checkpoint that never existed).
#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("session {session_id} not found")]
    SessionNotFound { session_id: uuid::Uuid },
}
