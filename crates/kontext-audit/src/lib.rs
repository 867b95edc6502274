//! Audit export and compliance certificate rendering (C9): turning the
//! Store's retained state into a portable, independently-verifiable bundle
//! or a self-attesting per-agent summary.

pub mod certificate;
pub mod error;
pub mod export;

pub use certificate::{compliance_certificate, verify_content_hash, CertificateRange, ComplianceCertificate, OverallStatus};
pub use error::AuditError;
pub use export::{export, AuditExport, ExportFilters, ExportFormat, JsonBundle};
