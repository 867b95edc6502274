use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("approval request {request_id} not found")]
    ApprovalNotFound { request_id: Uuid },
    #[error("approval request {request_id} has expired")]
    ApprovalExpired { request_id: Uuid },
    #[error("approval request {request_id} is not pending")]
    ApprovalNotPending { request_id: Uuid },
    #[error("missing required evidence: {missing:?}")]
    InsufficientEvidence { missing: Vec<String> },
    #[error("anomaly event rejected: {0}")]
    Log(#[from] kontext_core::LogRejection),
}
