//! Top-level error taxonomy for the façade, wrapping every constituent
//! crate's error the way `vex-api` wraps its constituent crates' errors for
//! its HTTP layer (spec.md §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] kontext_core::CoreError),

    #[error(transparent)]
    Store(#[from] kontext_store::StoreError),

    #[error(transparent)]
    Provenance(#[from] kontext_provenance::ProvenanceError),

    #[error(transparent)]
    Compliance(#[from] kontext_compliance::ComplianceError),

    #[error(transparent)]
    Rules(#[from] kontext_rules::RulesError),

    #[error(transparent)]
    Audit(#[from] kontext_audit::AuditError),

    #[error(transparent)]
    Log(#[from] kontext_core::LogRejection),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("validation failed: {0}")]
    Validation(String),
}
