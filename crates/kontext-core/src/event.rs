//! Event model — the single chained unit.
//!
//! An [`Event`] is the atomic record that gets bound into the digest chain.
//! Its `payload` is a type-tagged variant, one per [`EventType`]; the
//! discriminant and the payload variant must always agree, which
//! [`EventPayload::matches_type`] lets callers assert before construction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enumerated discriminator for [`Event::event_type`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    Action,
    Transaction,
    Reasoning,
    Anomaly,
    SessionStart,
    SessionEnd,
    CheckpointCreated,
    CheckpointAttested,
    CheckpointRejected,
    VerifyResult,
}

/// Severity tag shared by anomaly findings and compliance checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Constraints attached to a session (Layer 1 of provenance).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SessionConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_chains: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_tokens: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_recipients: Option<Vec<String>>,
}

/// A single compliance check outcome, as produced by the verifier (C6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComplianceCheck {
    pub name: String,
    pub passed: bool,
    pub severity: Severity,
    pub description: String,
}

/// Attestation decision attached to a checkpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttestationDecision {
    Approved,
    Rejected,
}

/// The delta carried by `session-start` / `session-end` events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionDelta {
    Start {
        delegated_by: String,
        scope: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        constraints: Option<SessionConstraints>,
    },
    End,
}

/// Type-tagged event payload — exactly one variant per [`EventType`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Action {
        action_type: String,
        metadata: serde_json::Value,
    },
    Transaction {
        tx_hash: String,
        chain: String,
        token: String,
        /// Arbitrary-precision decimal amount, never a float.
        amount: Decimal,
        from: String,
        to: String,
        metadata: serde_json::Value,
    },
    Reasoning {
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<u32>,
        reasoning_text: String,
        confidence: f64,
        context: serde_json::Value,
    },
    Anomaly {
        rule: String,
        severity: Severity,
        data: serde_json::Value,
    },
    Session(SessionDelta),
    Checkpoint {
        checkpoint_id: Uuid,
        action_ids: Vec<Uuid>,
        summary: String,
        actions_digest: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reviewer: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        decision: Option<AttestationDecision>,
    },
    VerifyResult {
        compliant: bool,
        risk_level: Severity,
        checks: Vec<ComplianceCheck>,
    },
}

impl EventPayload {
    /// Whether this payload variant is the one `event_type` expects.
    pub fn matches_type(&self, event_type: EventType) -> bool {
        matches!(
            (self, event_type),
            (EventPayload::Action { .. }, EventType::Action)
                | (EventPayload::Transaction { .. }, EventType::Transaction)
                | (EventPayload::Reasoning { .. }, EventType::Reasoning)
                | (EventPayload::Anomaly { .. }, EventType::Anomaly)
                | (
                    EventPayload::Session(SessionDelta::Start { .. }),
                    EventType::SessionStart
                )
                | (
                    EventPayload::Session(SessionDelta::End),
                    EventType::SessionEnd
                )
                | (
                    EventPayload::Checkpoint { decision: None, .. },
                    EventType::CheckpointCreated
                )
                | (
                    EventPayload::Checkpoint {
                        decision: Some(AttestationDecision::Approved),
                        ..
                    },
                    EventType::CheckpointAttested
                )
                | (
                    EventPayload::Checkpoint {
                        decision: Some(AttestationDecision::Rejected),
                        ..
                    },
                    EventType::CheckpointRejected
                )
                | (EventPayload::VerifyResult { .. }, EventType::VerifyResult)
        )
    }
}

/// An event before it has been bound into the chain: no `precision_timestamp`,
/// `digest`, `prior_digest` or `salt` yet — those four fields are assigned
/// together by [`crate::chain::DigestChain::append`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub project_id: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub correlation_id: String,
    pub event_type: EventType,
    pub description: String,
    pub payload: EventPayload,
}

/// A fully chained event — every field including the digest triple is
/// present. Once appended, no field is mutable (enforced by the Store, which
/// never exposes a `&mut Event` to callers after insertion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub precision_timestamp: u64,
    pub project_id: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub correlation_id: String,
    pub event_type: EventType,
    pub description: String,
    pub payload: EventPayload,
    pub digest: String,
    pub prior_digest: String,
    pub salt: String,
}

/// Borrowed view of an [`Event`] used for canonical serialization — omits
/// `digest`, `prior_digest`, and `salt` per the C1 serializer contract.
#[derive(Serialize)]
pub(crate) struct SerializableEvent<'a> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub precision_timestamp: u64,
    pub project_id: &'a str,
    pub agent_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub correlation_id: &'a str,
    pub event_type: EventType,
    pub description: &'a str,
    pub payload: &'a EventPayload,
}

impl<'a> From<&'a Event> for SerializableEvent<'a> {
    fn from(event: &'a Event) -> Self {
        Self {
            id: event.id,
            timestamp: event.timestamp,
            precision_timestamp: event.precision_timestamp,
            project_id: &event.project_id,
            agent_id: &event.agent_id,
            session_id: event.session_id,
            correlation_id: &event.correlation_id,
            event_type: event.event_type,
            description: &event.description,
            payload: &event.payload,
        }
    }
}

impl Event {
    /// Assemble the full struct from a [`PendingEvent`] plus the three
    /// chain-assigned fields. Digest fields start empty; the caller
    /// (`DigestChain::append`) fills them in immediately after.
    pub(crate) fn from_pending(pending: PendingEvent, precision_timestamp: u64) -> Self {
        Self {
            id: pending.id,
            timestamp: pending.timestamp,
            precision_timestamp,
            project_id: pending.project_id,
            agent_id: pending.agent_id,
            session_id: pending.session_id,
            correlation_id: pending.correlation_id,
            event_type: pending.event_type,
            description: pending.description,
            payload: pending.payload,
            digest: String::new(),
            prior_digest: String::new(),
            salt: String::new(),
        }
    }

    /// A "user action" per §4.5: an event with a session id that is not one
    /// of the five provenance-internal types.
    pub fn is_user_action(&self) -> bool {
        !matches!(
            self.event_type,
            EventType::SessionStart
                | EventType::SessionEnd
                | EventType::CheckpointCreated
                | EventType::CheckpointAttested
                | EventType::CheckpointRejected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_matches_type() {
        let action = EventPayload::Action {
            action_type: "swap".into(),
            metadata: serde_json::json!({}),
        };
        assert!(action.matches_type(EventType::Action));
        assert!(!action.matches_type(EventType::Transaction));

        let start = EventPayload::Session(SessionDelta::Start {
            delegated_by: "owner".into(),
            scope: vec!["transfer".into()],
            constraints: None,
        });
        assert!(start.matches_type(EventType::SessionStart));
        assert!(!start.matches_type(EventType::SessionEnd));
    }

    #[test]
    fn user_action_excludes_provenance_internal_types() {
        let mut pending = PendingEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            project_id: "proj".into(),
            agent_id: "agent".into(),
            session_id: None,
            correlation_id: "corr".into(),
            event_type: EventType::SessionStart,
            description: "".into(),
            payload: EventPayload::Session(SessionDelta::Start {
                delegated_by: "owner".into(),
                scope: vec![],
                constraints: None,
            }),
        };
        let event = Event::from_pending(pending.clone(), 0);
        assert!(!event.is_user_action());

        pending.event_type = EventType::Action;
        pending.payload = EventPayload::Action {
            action_type: "noop".into(),
            metadata: serde_json::json!({}),
        };
        let event = Event::from_pending(pending, 1);
        assert!(event.is_user_action());
    }
}
