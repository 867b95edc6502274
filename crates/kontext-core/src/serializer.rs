//! Canonical serialization (C1) — RFC 8785 JSON Canonicalization Scheme.
//!
//! [`canonical_bytes`] is the single function every other component calls
//! before hashing: the digest chain, the audit certificate, and the
//! sanctions snapshot fingerprint all route through it so that the same
//! event always produces the same bytes on every platform.

use crate::error::CoreError;
use crate::event::{Event, SerializableEvent};

/// Produce the canonical JCS byte image of `event`, excluding `digest`,
/// `prior_digest`, and `salt`.
pub fn canonical_bytes(event: &Event) -> Result<Vec<u8>, CoreError> {
    let view = SerializableEvent::from(event);
    serde_jcs::to_vec(&view).map_err(CoreError::Canonicalize)
}

/// Produce the canonical JCS byte image of any serializable value. Used by
/// the audit certificate and sanctions snapshot, which canonicalize values
/// other than [`Event`].
pub fn canonical_bytes_of<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    serde_jcs::to_vec(value).map_err(CoreError::Canonicalize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPayload, EventType, PendingEvent};
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_event() -> Event {
        let pending = PendingEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            project_id: "proj-1".into(),
            agent_id: "agent-1".into(),
            session_id: None,
            correlation_id: "corr-1".into(),
            event_type: EventType::Action,
            description: "noop".into(),
            payload: EventPayload::Action {
                action_type: "noop".into(),
                metadata: serde_json::json!({"b": 1, "a": 2}),
            },
        };
        Event::from_pending(pending, 42)
    }

    #[test]
    fn canonical_bytes_are_deterministic_across_calls() {
        let event = sample_event();
        let first = canonical_bytes(&event).unwrap();
        let second = canonical_bytes(&event).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn canonical_bytes_order_object_keys_lexicographically() {
        let event = sample_event();
        let bytes = canonical_bytes(&event).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        // nested metadata keys "a" and "b" must appear in lexicographic order
        assert!(text.find("\"a\":2").unwrap() < text.find("\"b\":1").unwrap());
    }

    #[test]
    fn canonical_bytes_exclude_digest_fields() {
        let mut event = sample_event();
        event.digest = "deadbeef".repeat(8);
        event.prior_digest = "0".repeat(64);
        event.salt = "cafebabe".into();
        let text = String::from_utf8(canonical_bytes(&event).unwrap()).unwrap();
        assert!(!text.contains("deadbeef"));
        assert!(!text.contains("cafebabe"));
        assert!(!text.contains("prior_digest"));
    }
}
