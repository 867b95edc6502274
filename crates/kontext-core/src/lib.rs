//! Event model, canonical serialization, and digest chain primitives shared
//! by every other Kontext crate.

pub mod address;
pub mod chain;
pub mod error;
pub mod event;
pub mod ports;
pub mod provenance;
pub mod serializer;

pub use address::{classify, is_evm_format, normalize, ChainFamily};
pub use chain::{ChainExport, ChainLink, ChainVerification, DigestChain, MonotonicClock, genesis_digest};
pub use error::CoreError;
pub use event::{
    AttestationDecision, ComplianceCheck, Event, EventPayload, EventType, PendingEvent, Severity,
    SessionConstraints, SessionDelta,
};
pub use ports::{EventLogger, LogRejection};
pub use provenance::{actions_digest, Attestation, Checkpoint, CheckpointStatus, Session, SessionStatus};
pub use serializer::{canonical_bytes, canonical_bytes_of};
