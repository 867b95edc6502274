//! Integration tests for the session/checkpoint state machine (scenarios E3
//! and E4 from spec.md §8), driven through a minimal test-double logger that
//! exercises the same chain-then-store sequence `kontext-engine::Logger`
//! performs on the hot path.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use kontext_core::{DigestChain, Event, EventLogger, LogRejection, PendingEvent};
use kontext_provenance::{AttestationInput, CreateSessionInput, ProvenanceManager};
use kontext_store::backend::MemoryAdapter;
use kontext_store::{EventStore, StoreLimits};

struct TestLogger {
    chain: Mutex<DigestChain>,
    store: Arc<EventStore<MemoryAdapter>>,
}

#[async_trait]
impl EventLogger for TestLogger {
    async fn log(&self, pending: PendingEvent) -> Result<Event, LogRejection> {
        let mut chain = self.chain.lock().await;
        let event = chain.append(pending)?;
        self.store.add_event(event.clone()).await;
        Ok(event)
    }
}

fn harness() -> (TestLogger, Arc<EventStore<MemoryAdapter>>) {
    let store = Arc::new(EventStore::new(Arc::new(MemoryAdapter::new()), StoreLimits::default()));
    let logger = TestLogger {
        chain: Mutex::new(DigestChain::new()),
        store: store.clone(),
    };
    (logger, store)
}

fn session_input() -> CreateSessionInput {
    CreateSessionInput {
        project_id: "proj".into(),
        agent_id: "agent-1".into(),
        correlation_id: None,
        delegated_by: "owner".into(),
        scope: vec!["transfer".into()],
        constraints: None,
        expires_at: None,
    }
}

async fn log_transaction(logger: &TestLogger, session_id: Uuid, agent_id: &str) -> Event {
    use kontext_core::{EventPayload, EventType};
    let pending = PendingEvent {
        id: Uuid::new_v4(),
        timestamp: chrono::Utc::now(),
        project_id: "proj".into(),
        agent_id: agent_id.into(),
        session_id: Some(session_id),
        correlation_id: Uuid::new_v4().to_string(),
        event_type: EventType::Transaction,
        description: "transfer".into(),
        payload: EventPayload::Transaction {
            tx_hash: format!("0x{}", Uuid::new_v4().simple()),
            chain: "base".into(),
            token: "USDC".into(),
            amount: "100".parse().unwrap(),
            from: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into(),
            to: "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".into(),
            metadata: serde_json::json!({}),
        },
    };
    logger.log(pending).await.unwrap()
}

#[tokio::test]
async fn e3_session_lifecycle_rejects_events_after_end() {
    let (logger, store) = harness();
    let manager = ProvenanceManager::new(store.clone());

    let session = manager.create_session(session_input(), &logger).await.unwrap();
    log_transaction(&logger, session.session_id, "agent-1").await;

    let ended = manager.end_session(session.session_id, "proj", &logger).await.unwrap();
    assert_eq!(ended.status, kontext_core::SessionStatus::Ended);

    assert!(!manager.validate_scope(session.session_id, "transfer").await);

    let bundle = manager.provenance_bundle(session.session_id, true).await.unwrap();
    assert_eq!(bundle.session.status, kontext_core::SessionStatus::Ended);
    assert_eq!(bundle.total_actions, 1);
}

#[tokio::test]
async fn e4_checkpoint_attestation_covers_all_actions() {
    let (logger, store) = harness();
    let manager = ProvenanceManager::new(store.clone());

    let session = manager.create_session(session_input(), &logger).await.unwrap();
    let mut action_ids = Vec::new();
    for _ in 0..3 {
        let event = log_transaction(&logger, session.session_id, "agent-1").await;
        action_ids.push(event.id);
    }

    let checkpoint = manager
        .create_checkpoint(
            session.session_id,
            action_ids.clone(),
            "weekly review".into(),
            Some(Duration::hours(1)),
            "proj",
            &logger,
        )
        .await
        .unwrap();

    let attested = manager
        .attach_attestation(
            AttestationInput {
                checkpoint_id: checkpoint.checkpoint_id,
                reviewer_id: "reviewer-1".into(),
                decision: kontext_core::AttestationDecision::Approved,
                signature: vec![0xAB; 8],
            },
            "proj",
            &logger,
        )
        .await
        .unwrap();
    assert_eq!(attested.status, kontext_core::CheckpointStatus::Attested);

    let bundle = manager.provenance_bundle(session.session_id, true).await.unwrap();
    assert_eq!(bundle.total_actions, 3);
    assert_eq!(bundle.human_attested, 3);
    assert_eq!(bundle.unattested, 0);

    let mut digests: Vec<String> = store
        .events_by_session(session.session_id)
        .await
        .into_iter()
        .filter(|e| action_ids.contains(&e.id))
        .map(|e| e.digest)
        .collect();
    digests.sort();
    assert_eq!(kontext_core::actions_digest(digests), checkpoint.actions_digest);
}

#[tokio::test]
async fn checkpoint_rejects_action_ids_outside_session() {
    let (logger, store) = harness();
    let manager = ProvenanceManager::new(store.clone());

    let session_a = manager.create_session(session_input(), &logger).await.unwrap();
    let mut other_input = session_input();
    other_input.agent_id = "agent-2".into();
    let session_b = manager.create_session(other_input, &logger).await.unwrap();

    let foreign_action = log_transaction(&logger, session_b.session_id, "agent-2").await;

    let result = manager
        .create_checkpoint(
            session_a.session_id,
            vec![foreign_action.id],
            "bad checkpoint".into(),
            None,
            "proj",
            &logger,
        )
        .await;
    assert!(result.is_err());
}
