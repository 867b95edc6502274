//! Property-based tests for the universal digest-chain invariants that live
//! entirely within `kontext-core` (linkage, determinism, tamper/reorder
//! detection, length mismatch, export round-trip, canonical stability).

use chrono::Utc;
use kontext_core::{
    canonical_bytes, chain::genesis_digest, DigestChain, Event, EventPayload, EventType,
    PendingEvent,
};
use proptest::prelude::*;
use uuid::Uuid;

fn action_pending(seed: u32) -> PendingEvent {
    PendingEvent {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        project_id: "proj".into(),
        agent_id: "agent".into(),
        session_id: None,
        correlation_id: format!("corr-{seed}"),
        event_type: EventType::Action,
        description: format!("action {seed}"),
        payload: EventPayload::Action {
            action_type: "noop".into(),
            metadata: serde_json::json!({"seed": seed}),
        },
    }
}

fn mutate_description(event: &mut Event) {
    event.description.push_str("-tampered");
}

proptest! {
    /// Invariant 1: chain linkage — every link's prior_digest equals the
    /// predecessor's digest, or GENESIS at index 0.
    #[test]
    fn chain_linkage_holds(seeds in prop::collection::vec(0u32..1000, 1..20)) {
        let mut chain = DigestChain::new();
        let mut prior = genesis_digest();
        for seed in seeds {
            let event = chain.append(action_pending(seed)).unwrap();
            prop_assert_eq!(&event.prior_digest, &prior);
            prior = event.digest.clone();
        }
    }

    /// Invariant 2: deterministic digest — two chains fed the same events in
    /// the same order (ignoring the precision timestamp's wall-clock jitter,
    /// which only affects salt, not the outcome of the linkage check) each
    /// independently verify as intact.
    #[test]
    fn independent_chains_each_verify_intact(seeds in prop::collection::vec(0u32..1000, 1..20)) {
        for _ in 0..2 {
            let mut chain = DigestChain::new();
            let mut events = Vec::new();
            for seed in &seeds {
                events.push(chain.append(action_pending(*seed)).unwrap());
            }
            prop_assert!(chain.verify(&events).valid);
        }
    }

    /// Invariant 3: tamper detection — mutating any single event's
    /// description breaks verification at exactly the tampered index.
    #[test]
    fn tamper_detection(seeds in prop::collection::vec(0u32..1000, 2..20), tamper_at in 0usize..2) {
        let mut chain = DigestChain::new();
        let mut events = Vec::new();
        for seed in &seeds {
            events.push(chain.append(action_pending(*seed)).unwrap());
        }
        let index = tamper_at % events.len();
        mutate_description(&mut events[index]);
        let outcome = chain.verify(&events);
        prop_assert!(!outcome.valid, "tampered chain verified as intact");
        prop_assert_eq!(outcome.first_invalid_index, Some(index as u64));
    }

    /// Invariant 4: reorder detection — swapping any two distinct events
    /// breaks verification.
    #[test]
    fn reorder_detection(seeds in prop::collection::vec(0u32..1000, 2..20)) {
        let mut chain = DigestChain::new();
        let mut events = Vec::new();
        for seed in &seeds {
            events.push(chain.append(action_pending(*seed)).unwrap());
        }
        events.swap(0, events.len() - 1);
        prop_assert!(!chain.verify(&events).valid, "reordered chain verified as intact");
    }

    /// Invariant 5: length mismatch — a shorter or longer event slice never
    /// verifies as intact.
    #[test]
    fn length_mismatch_is_invalid(seeds in prop::collection::vec(0u32..1000, 2..20)) {
        let mut chain = DigestChain::new();
        let mut events = Vec::new();
        for seed in &seeds {
            events.push(chain.append(action_pending(*seed)).unwrap());
        }
        events.pop();
        let outcome = chain.verify(&events);
        prop_assert!(!outcome.valid, "truncated chain verified as intact");
        prop_assert_eq!(outcome.first_invalid_index, Some(0));
    }

    /// Invariant 6: export round-trip — verifying an exported chain against
    /// the same events yields the same outcome as verifying the live chain.
    #[test]
    fn export_round_trip_matches_live_verify(seeds in prop::collection::vec(0u32..1000, 0..20)) {
        let mut chain = DigestChain::new();
        let mut events = Vec::new();
        for seed in &seeds {
            events.push(chain.append(action_pending(*seed)).unwrap());
        }
        let export = chain.export();
        prop_assert_eq!(DigestChain::verify_exported(&export, &events), chain.verify(&events));
    }

    /// Invariant 7: canonical serialization is stable regardless of the
    /// order in which a metadata object's keys were constructed.
    #[test]
    fn canonical_bytes_stable_under_key_reshuffle(a in 0i64..100, b in 0i64..100) {
        let mut pending_one = action_pending(0);
        pending_one.payload = EventPayload::Action {
            action_type: "noop".into(),
            metadata: serde_json::json!({"a": a, "b": b}),
        };
        let mut pending_two = pending_one.clone();
        pending_two.payload = EventPayload::Action {
            action_type: "noop".into(),
            metadata: serde_json::json!({"b": b, "a": a}),
        };
        pending_two.id = pending_one.id;
        pending_two.timestamp = pending_one.timestamp;

        let mut chain_one = DigestChain::new();
        let mut chain_two = DigestChain::new();
        let event_one = chain_one.append(pending_one).unwrap();
        let event_two = chain_two.append(pending_two).unwrap();

        prop_assert_eq!(
            canonical_bytes(&event_one).unwrap(),
            canonical_bytes(&event_two).unwrap()
        );
    }
}

#[test]
fn empty_chain_has_genesis_terminal_and_verifies_with_zero_links() {
    let chain = DigestChain::new();
    assert_eq!(chain.terminal(), genesis_digest());
    let outcome = chain.verify(&[]);
    assert!(outcome.valid);
    assert_eq!(outcome.links_verified, 0);
}

#[test]
fn three_event_chain_matches_scenario_e2() {
    let mut chain = DigestChain::new();
    let a = chain.append(action_pending(1)).unwrap();
    let b = chain.append(action_pending(2)).unwrap();
    let c = chain.append(action_pending(3)).unwrap();
    let mut events = vec![a, b, c];

    assert_eq!(chain.terminal(), events[2].digest);
    assert!(chain.verify(&events).valid);

    events[1].description.push_str("-mutated");
    let outcome = chain.verify(&events);
    assert!(!outcome.valid, "mutated middle event should break verification");
    assert_eq!(outcome.first_invalid_index, Some(1));
}
