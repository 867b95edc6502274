//! Shared provenance data types — the session and checkpoint records that
//! `kontext-store` owns and `kontext-provenance` operates on. Kept in
//! `kontext-core` (alongside [`crate::event::Event`]) so neither of those
//! crates has to depend on the other to share a vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::SessionConstraints;

/// Session status (Layer 1 of provenance). `Expired` is never assigned by a
/// mutation — it is computed lazily by [`Session::effective_status`] on read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
    Expired,
}

/// A delegation record binding an agent to a scoped authority over a time
/// window (Layer 1 of provenance).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: Uuid,
    pub agent_id: String,
    pub delegated_by: String,
    pub scope: Vec<String>,
    #[serde(default)]
    pub constraints: Option<SessionConstraints>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// The chain digest of the `session-start` event that created this
    /// session — the provenance bundle's anchor into the digest chain.
    pub genesis_digest: String,
}

impl Session {
    /// The status as of `now`, applying lazy expiry: a session recorded as
    /// `active` past its `expires_at` reads as `expired` without a write.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        if self.status == SessionStatus::Active {
            if let Some(expires_at) = self.expires_at {
                if now > expires_at {
                    return SessionStatus::Expired;
                }
            }
        }
        self.status
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == SessionStatus::Active
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.scope.iter().any(|s| s == capability)
    }
}

/// Checkpoint status (Layer 3 of provenance). `Expired` is likewise computed
/// lazily, never assigned by a mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Attested,
    Rejected,
    Expired,
}

/// The human sign-off attached to a checkpoint. `signature` is opaque and
/// produced entirely outside the core — it is recorded verbatim, never
/// cryptographically verified here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attestation {
    pub reviewer_id: String,
    pub decision: crate::event::AttestationDecision,
    pub signature: Vec<u8>,
    pub decided_at: DateTime<Utc>,
}

/// A batch of action ids plus a human attestation summarizing a review
/// decision (Layer 3 of provenance).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub checkpoint_id: Uuid,
    pub session_id: Uuid,
    pub action_ids: Vec<Uuid>,
    pub summary: String,
    pub actions_digest: String,
    pub status: CheckpointStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<Attestation>,
}

impl Checkpoint {
    pub fn effective_status(&self, now: DateTime<Utc>) -> CheckpointStatus {
        if self.status == CheckpointStatus::Pending {
            if let Some(expires_at) = self.expires_at {
                if now > expires_at {
                    return CheckpointStatus::Expired;
                }
            }
        }
        self.status
    }
}

/// `actions_digest = SHA256( sort(digests_of_referenced_events).concat() )`,
/// per spec.md §3's Checkpoint invariant.
pub fn actions_digest(mut digests: Vec<String>) -> String {
    use sha2::{Digest, Sha256};
    digests.sort();
    let mut hasher = Sha256::new();
    for digest in &digests {
        hasher.update(digest.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_session(status: SessionStatus, expires_at: Option<DateTime<Utc>>) -> Session {
        Session {
            session_id: Uuid::new_v4(),
            agent_id: "agent".into(),
            delegated_by: "owner".into(),
            scope: vec!["transfer".into()],
            constraints: None,
            status,
            created_at: Utc::now(),
            expires_at,
            ended_at: None,
            genesis_digest: "0".repeat(64),
        }
    }

    #[test]
    fn active_session_expires_lazily_past_deadline() {
        let now = Utc::now();
        let session = sample_session(SessionStatus::Active, Some(now - Duration::seconds(1)));
        assert_eq!(session.effective_status(now), SessionStatus::Expired);
        assert!(!session.is_active(now));
    }

    #[test]
    fn ended_session_never_reports_expired() {
        let now = Utc::now();
        let mut session = sample_session(SessionStatus::Ended, Some(now - Duration::seconds(1)));
        session.ended_at = Some(now - Duration::seconds(2));
        assert_eq!(session.effective_status(now), SessionStatus::Ended);
    }

    #[test]
    fn actions_digest_is_order_independent() {
        let a = vec!["b".to_string(), "a".to_string(), "c".to_string()];
        let b = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(actions_digest(a), actions_digest(b));
    }
}
