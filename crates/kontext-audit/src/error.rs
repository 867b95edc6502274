use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to render csv export: {0}")]
    Csv(String),
    #[error("failed to canonicalize certificate for hashing: {0}")]
    Canonicalize(#[from] kontext_core::CoreError),
}

impl From<csv::Error> for AuditError {
    fn from(err: csv::Error) -> Self {
        AuditError::Csv(err.to_string())
    }
}
