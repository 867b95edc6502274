//! Deterministic rule bank (C7 Anomaly Engine) and policy evaluator (C8
//! Approval Engine). Neither depends on `kontext-engine`; both are handed
//! an `&dyn EventLogger` or act as a pure in-memory evaluator so they stay
//! unit-testable in isolation.

pub mod anomaly;
pub mod approval;
pub mod error;

pub use anomaly::{AnomalyConfig, AnomalyContext, AnomalyEngine, AnomalyFinding, AnomalyRule};
pub use approval::{
    ApprovalDecision, ApprovalDecisionRecord, ApprovalEngine, ApprovalPolicy, ApprovalRequest,
    ApprovalStatus, EvaluateInput,
};
pub use error::RulesError;
