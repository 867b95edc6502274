//! Append-only event store (C3) — typed collections, secondary indexes,
//! bounded retention, and flush/restore against a [`StorageAdapter`].
//!
//! Grounded on `vex-persist`'s per-entity-type store split (`AgentStore`,
//! `ContextStore`, `AuditStore`) folded into one type, since spec.md §3
//! makes a single Store the exclusive owner of events, sessions, and
//! checkpoints.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use kontext_core::{Checkpoint, CheckpointStatus, Event, EventType, Session, SessionStatus};

use crate::backend::{
    StorageAdapter, StorageAdapterExt, KEY_ANOMALIES, KEY_CHECKPOINTS, KEY_EVENTS, KEY_SESSIONS,
    KEY_TASKS, KEY_TRANSACTIONS,
};
use crate::error::StoreError;
use crate::task::TaskRecord;

/// Retention limits for the Store's ordered collections. Defaults match
/// spec.md §4.3 exactly: 10 000 entries, evicting the oldest 10% once
/// exceeded.
#[derive(Debug, Clone, Copy)]
pub struct StoreLimits {
    pub max_events: usize,
    pub max_anomalies: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_events: 10_000,
            max_anomalies: 10_000,
        }
    }
}

fn eviction_batch(max: usize) -> usize {
    ((max as f64) * 0.10).ceil() as usize
}

/// A query predicate over the event collection, used by
/// [`EventStore::events_matching`].
pub type EventPredicate<'a> = dyn Fn(&Event) -> bool + Send + Sync + 'a;

#[derive(Debug, Default)]
struct StoreState {
    order: VecDeque<Uuid>,
    bodies: HashMap<Uuid, Event>,
    sequence_of: HashMap<Uuid, u64>,
    next_sequence: u64,
    flushed_through_sequence: u64,

    by_agent: HashMap<String, Vec<Uuid>>,
    by_session: HashMap<Uuid, Vec<Uuid>>,

    transaction_order: VecDeque<Uuid>,
    anomaly_order: VecDeque<Uuid>,

    tasks: HashMap<Uuid, TaskRecord>,
    sessions: HashMap<Uuid, Session>,
    checkpoints: HashMap<Uuid, Checkpoint>,
}

/// Snapshots handed to the Storage Adapter on `flush()`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct FlushSnapshot {
    events: Vec<Event>,
    transactions: Vec<Event>,
    tasks: Vec<TaskRecord>,
    anomalies: Vec<Event>,
    sessions: Vec<Session>,
    checkpoints: Vec<Checkpoint>,
}

/// Append-only event store (C3). Exclusively mutated by the Logger (per
/// spec.md §5); queries may proceed concurrently with each other.
pub struct EventStore<A: StorageAdapter + ?Sized> {
    state: RwLock<StoreState>,
    /// Single-slot in-flight flag serializing flush/restore (spec.md §5,
    /// Shared resource policy (a)).
    flush_lock: tokio::sync::Mutex<()>,
    limits: StoreLimits,
    backend: std::sync::Arc<A>,
}

impl<A: StorageAdapter + ?Sized> EventStore<A> {
    pub fn new(backend: std::sync::Arc<A>, limits: StoreLimits) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            flush_lock: tokio::sync::Mutex::new(()),
            limits,
            backend,
        }
    }

    // ---- mutation: events ------------------------------------------------

    /// Append a fully chained event into the store, updating every index
    /// and derived collection it belongs to. Never fails on a well-formed
    /// event — the only failure mode in spec.md §4.3 is storage I/O, which
    /// `add_event` never touches.
    pub async fn add_event(&self, event: Event) {
        let mut state = self.state.write().await;
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        state.by_agent.entry(event.agent_id.clone()).or_default().push(event.id);
        if let Some(session_id) = event.session_id {
            state.by_session.entry(session_id).or_default().push(event.id);
        }
        if event.event_type == EventType::Transaction {
            state.transaction_order.push_back(event.id);
        }
        if event.event_type == EventType::Anomaly {
            state.anomaly_order.push_back(event.id);
        }
        if let Some(task) = TaskRecord::from_event(&event) {
            state.tasks.insert(task.task_id, task);
        }

        state.sequence_of.insert(event.id, sequence);
        state.order.push_back(event.id);
        state.bodies.insert(event.id, event);

        self.evict_if_needed(&mut state);
    }

    fn evict_if_needed(&self, state: &mut StoreState) {
        self.evict_ordered(
            state,
            |s| &mut s.order,
            self.limits.max_events,
            "events",
        );
        let anomaly_batch = eviction_batch(self.limits.max_anomalies);
        if state.anomaly_order.len() > self.limits.max_anomalies {
            let mut evicted = 0usize;
            while evicted < anomaly_batch {
                let Some(front) = state.anomaly_order.front() else { break };
                let sequence = state.sequence_of.get(front).copied().unwrap_or(0);
                if sequence > state.flushed_through_sequence {
                    break;
                }
                state.anomaly_order.pop_front();
                evicted += 1;
            }
            if evicted < anomaly_batch {
                tracing::warn!(
                    "anomaly retention exceeded ({} entries) but oldest entries are not yet flushed; deferring eviction",
                    state.anomaly_order.len()
                );
            }
        }
    }

    /// Evict the oldest ⌈10%⌉ of `order` once it exceeds `max`, but only
    /// entries already confirmed flushed — the spec.md §9 Open Question 3
    /// resolution (option b: require evicted bodies to be persisted before
    /// removal from memory). Also prunes the evicted ids out of `by_agent`,
    /// `by_session`, and `transaction_order` so those indexes stay bounded
    /// alongside the primary collection rather than growing forever.
    fn evict_ordered(
        &self,
        state: &mut StoreState,
        select: impl Fn(&mut StoreState) -> &mut VecDeque<Uuid>,
        max: usize,
        label: &str,
    ) {
        if select(state).len() <= max {
            return;
        }
        let batch = eviction_batch(max);
        let mut evicted = 0usize;
        loop {
            if evicted >= batch {
                break;
            }
            let front = select(state).front().copied();
            let Some(event_id) = front else { break };
            let sequence = state.sequence_of.get(&event_id).copied().unwrap_or(0);
            if sequence > state.flushed_through_sequence {
                break;
            }
            select(state).pop_front();
            if let Some(event) = state.bodies.remove(&event_id) {
                Self::prune_secondary_indexes(state, &event);
            }
            state.sequence_of.remove(&event_id);
            evicted += 1;
        }
        if evicted < batch {
            tracing::warn!(
                "{label} retention exceeded ({} entries) but oldest entries are not yet flushed; deferring eviction",
                select(state).len()
            );
        } else {
            tracing::info!("evicted {evicted} {label} entries past retention limit");
        }
    }

    /// Removes `event`'s id from every secondary index it could be in.
    /// Called once per evicted event so `by_agent`/`by_session`/
    /// `transaction_order` never outlive the bodies they point at.
    fn prune_secondary_indexes(state: &mut StoreState, event: &Event) {
        if let Some(ids) = state.by_agent.get_mut(&event.agent_id) {
            ids.retain(|id| *id != event.id);
            if ids.is_empty() {
                state.by_agent.remove(&event.agent_id);
            }
        }
        if let Some(session_id) = event.session_id {
            if let Some(ids) = state.by_session.get_mut(&session_id) {
                ids.retain(|id| *id != event.id);
                if ids.is_empty() {
                    state.by_session.remove(&session_id);
                }
            }
        }
        if event.event_type == EventType::Transaction {
            state.transaction_order.retain(|id| *id != event.id);
        }
    }

    // ---- mutation: sessions / checkpoints ---------------------------------

    pub async fn upsert_session(&self, session: Session) {
        let mut state = self.state.write().await;
        state.sessions.insert(session.session_id, session);
    }

    pub async fn get_session(&self, session_id: Uuid) -> Option<Session> {
        self.state.read().await.sessions.get(&session_id).cloned()
    }

    /// Effective status as of now, applying lazy expiry without a write.
    pub async fn session_status(&self, session_id: Uuid, now: DateTime<Utc>) -> Option<SessionStatus> {
        self.state
            .read()
            .await
            .sessions
            .get(&session_id)
            .map(|s| s.effective_status(now))
    }

    pub async fn upsert_checkpoint(&self, checkpoint: Checkpoint) {
        let mut state = self.state.write().await;
        state.checkpoints.insert(checkpoint.checkpoint_id, checkpoint);
    }

    pub async fn get_checkpoint(&self, checkpoint_id: Uuid) -> Option<Checkpoint> {
        self.state.read().await.checkpoints.get(&checkpoint_id).cloned()
    }

    pub async fn checkpoint_status(
        &self,
        checkpoint_id: Uuid,
        now: DateTime<Utc>,
    ) -> Option<CheckpointStatus> {
        self.state
            .read()
            .await
            .checkpoints
            .get(&checkpoint_id)
            .map(|c| c.effective_status(now))
    }

    /// Every session currently held, for export and certificate rendering.
    pub async fn all_sessions(&self) -> Vec<Session> {
        self.state.read().await.sessions.values().cloned().collect()
    }

    /// Every checkpoint currently held, for export and certificate rendering.
    pub async fn all_checkpoints(&self) -> Vec<Checkpoint> {
        self.state.read().await.checkpoints.values().cloned().collect()
    }

    pub async fn checkpoints_for_session(&self, session_id: Uuid) -> Vec<Checkpoint> {
        self.state
            .read()
            .await
            .checkpoints
            .values()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect()
    }

    // ---- queries -----------------------------------------------------------

    pub async fn get_event(&self, event_id: Uuid) -> Option<Event> {
        self.state.read().await.bodies.get(&event_id).cloned()
    }

    pub async fn events_by_agent(&self, agent_id: &str) -> Vec<Event> {
        let state = self.state.read().await;
        state
            .by_agent
            .get(agent_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.bodies.get(id).cloned())
            .collect()
    }

    pub async fn events_by_session(&self, session_id: Uuid) -> Vec<Event> {
        let state = self.state.read().await;
        state
            .by_session
            .get(&session_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.bodies.get(id).cloned())
            .collect()
    }

    pub async fn last_n_by_agent(&self, agent_id: &str, n: usize) -> Vec<Event> {
        let events = self.events_by_agent(agent_id).await;
        let skip = events.len().saturating_sub(n);
        events[skip..].to_vec()
    }

    /// All events currently retained, in append order. Used by export (C9)
    /// and chain re-verification.
    pub async fn all_events(&self) -> Vec<Event> {
        let state = self.state.read().await;
        state.order.iter().filter_map(|id| state.bodies.get(id).cloned()).collect()
    }

    pub async fn events_matching(&self, predicate: &EventPredicate<'_>) -> Vec<Event> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.bodies.get(id))
            .filter(|event| predicate(event))
            .cloned()
            .collect()
    }

    pub async fn recent_anomalies_for_agent(&self, agent_id: &str, since: DateTime<Utc>) -> Vec<Event> {
        let state = self.state.read().await;
        state
            .anomaly_order
            .iter()
            .filter_map(|id| state.bodies.get(id))
            .filter(|event| event.agent_id == agent_id && event.timestamp >= since)
            .cloned()
            .collect()
    }

    pub async fn tasks_for_agent(&self, agent_id: &str) -> Vec<TaskRecord> {
        self.state
            .read()
            .await
            .tasks
            .values()
            .filter(|t| t.agent_id == agent_id)
            .cloned()
            .collect()
    }

    pub async fn event_count(&self) -> usize {
        self.state.read().await.order.len()
    }

    // ---- flush / restore -----------------------------------------------------

    /// Snapshot every collection under the lock, then persist without
    /// holding it — spec.md §5's "Suspension points" rule, and the
    /// single-slot in-flight flag serializes concurrent flushes (§5 Shared
    /// resource policy (a)).
    pub async fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.flush_lock.lock().await;
        let (snapshot, flushed_through) = {
            let state = self.state.read().await;
            let snapshot = FlushSnapshot {
                events: state.order.iter().filter_map(|id| state.bodies.get(id).cloned()).collect(),
                transactions: state
                    .transaction_order
                    .iter()
                    .filter_map(|id| state.bodies.get(id).cloned())
                    .collect(),
                tasks: state.tasks.values().cloned().collect(),
                anomalies: state
                    .anomaly_order
                    .iter()
                    .filter_map(|id| state.bodies.get(id).cloned())
                    .collect(),
                sessions: state.sessions.values().cloned().collect(),
                checkpoints: state.checkpoints.values().cloned().collect(),
            };
            (snapshot, state.next_sequence)
        };

        self.backend.save_typed(KEY_EVENTS, &snapshot.events).await?;
        self.backend.save_typed(KEY_TRANSACTIONS, &snapshot.transactions).await?;
        self.backend.save_typed(KEY_TASKS, &snapshot.tasks).await?;
        self.backend.save_typed(KEY_ANOMALIES, &snapshot.anomalies).await?;
        self.backend.save_typed(KEY_SESSIONS, &snapshot.sessions).await?;
        self.backend.save_typed(KEY_CHECKPOINTS, &snapshot.checkpoints).await?;

        let mut state = self.state.write().await;
        state.flushed_through_sequence = flushed_through;
        tracing::info!(events = snapshot.events.len(), "flush complete");
        Ok(())
    }

    /// Load each key and replace the in-memory collections atomically.
    /// Rejects restored events missing their digest triple (spec.md §9 Open
    /// Question 1) rather than silently skipping them. A storage error
    /// leaves the store empty, per spec.md §7's propagation policy.
    pub async fn restore(&self) -> Result<(), StoreError> {
        let _guard = self.flush_lock.lock().await;

        let events: Vec<Event> = self.backend.load_typed(KEY_EVENTS).await?.unwrap_or_default();
        for event in &events {
            if event.digest.is_empty() || event.prior_digest.is_empty() || event.salt.is_empty() {
                return Err(StoreError::MissingDigestFields { event_id: event.id });
            }
        }
        let tasks: Vec<TaskRecord> = self.backend.load_typed(KEY_TASKS).await?.unwrap_or_default();
        let sessions: Vec<Session> = self.backend.load_typed(KEY_SESSIONS).await?.unwrap_or_default();
        let checkpoints: Vec<Checkpoint> = self.backend.load_typed(KEY_CHECKPOINTS).await?.unwrap_or_default();

        let mut new_state = StoreState::default();
        for (sequence, event) in events.into_iter().enumerate() {
            let sequence = sequence as u64;
            new_state.by_agent.entry(event.agent_id.clone()).or_default().push(event.id);
            if let Some(session_id) = event.session_id {
                new_state.by_session.entry(session_id).or_default().push(event.id);
            }
            if event.event_type == EventType::Transaction {
                new_state.transaction_order.push_back(event.id);
            }
            if event.event_type == EventType::Anomaly {
                new_state.anomaly_order.push_back(event.id);
            }
            new_state.sequence_of.insert(event.id, sequence);
            new_state.order.push_back(event.id);
            new_state.bodies.insert(event.id, event);
            new_state.next_sequence = sequence + 1;
        }
        for task in tasks {
            new_state.tasks.insert(task.task_id, task);
        }
        for session in sessions {
            new_state.sessions.insert(session.session_id, session);
        }
        for checkpoint in checkpoints {
            new_state.checkpoints.insert(checkpoint.checkpoint_id, checkpoint);
        }
        new_state.flushed_through_sequence = new_state.next_sequence;

        let mut state = self.state.write().await;
        *state = new_state;
        tracing::info!(events = state.order.len(), "restore complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryAdapter;
    use kontext_core::{DigestChain, EventPayload, PendingEvent};

    fn action_pending(agent_id: &str) -> PendingEvent {
        PendingEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            project_id: "proj".into(),
            agent_id: agent_id.into(),
            session_id: None,
            correlation_id: "corr".into(),
            event_type: EventType::Action,
            description: "noop".into(),
            payload: EventPayload::Action {
                action_type: "noop".into(),
                metadata: serde_json::json!({}),
            },
        }
    }

    #[tokio::test]
    async fn add_and_query_by_agent() {
        let store = EventStore::new(std::sync::Arc::new(MemoryAdapter::new()), StoreLimits::default());
        let mut chain = DigestChain::new();
        let event = chain.append(action_pending("agent-1")).unwrap();
        store.add_event(event.clone()).await;

        let found = store.events_by_agent("agent-1").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, event.id);
        assert!(store.events_by_agent("agent-2").await.is_empty());
    }

    #[tokio::test]
    async fn flush_then_restore_round_trips_events() {
        let backend = std::sync::Arc::new(MemoryAdapter::new());
        let store = EventStore::new(backend.clone(), StoreLimits::default());
        let mut chain = DigestChain::new();
        for _ in 0..3 {
            let event = chain.append(action_pending("agent-1")).unwrap();
            store.add_event(event).await;
        }
        store.flush().await.unwrap();

        let restored = EventStore::new(backend, StoreLimits::default());
        restored.restore().await.unwrap();
        assert_eq!(restored.event_count().await, 3);
        assert_eq!(restored.events_by_agent("agent-1").await.len(), 3);
    }

    #[tokio::test]
    async fn restore_rejects_events_missing_digest_fields() {
        let backend = std::sync::Arc::new(MemoryAdapter::new());
        let mut pending = action_pending("agent-1");
        pending.id = Uuid::new_v4();
        let broken = Event {
            id: pending.id,
            timestamp: pending.timestamp,
            precision_timestamp: 0,
            project_id: pending.project_id,
            agent_id: pending.agent_id,
            session_id: None,
            correlation_id: pending.correlation_id,
            event_type: pending.event_type,
            description: pending.description,
            payload: pending.payload,
            digest: String::new(),
            prior_digest: String::new(),
            salt: String::new(),
        };
        backend.save_typed(KEY_EVENTS, &vec![broken]).await.unwrap();

        let store = EventStore::new(backend, StoreLimits::default());
        match store.restore().await {
            Err(StoreError::MissingDigestFields { .. }) => {}
            other => panic!("expected MissingDigestFields, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn eviction_is_deferred_until_flushed() {
        let store = EventStore::new(
            std::sync::Arc::new(MemoryAdapter::new()),
            StoreLimits { max_events: 5, max_anomalies: 5 },
        );
        let mut chain = DigestChain::new();
        for _ in 0..8 {
            let event = chain.append(action_pending("agent-1")).unwrap();
            store.add_event(event).await;
        }
        // Nothing has been flushed yet, so no eviction should have happened.
        assert_eq!(store.event_count().await, 8);

        store.flush().await.unwrap();
        for _ in 0..8 {
            let event = chain.append(action_pending("agent-1")).unwrap();
            store.add_event(event).await;
        }
        // Now that the first 8 are flushed, retention can evict down again.
        assert!(store.event_count().await < 16);
    }

    #[tokio::test]
    async fn eviction_prunes_secondary_indexes_too() {
        let store = EventStore::new(
            std::sync::Arc::new(MemoryAdapter::new()),
            StoreLimits { max_events: 5, max_anomalies: 5 },
        );
        let mut chain = DigestChain::new();
        for _ in 0..8 {
            let event = chain.append(action_pending("agent-1")).unwrap();
            store.add_event(event).await;
        }
        store.flush().await.unwrap();
        for _ in 0..8 {
            let event = chain.append(action_pending("agent-1")).unwrap();
            store.add_event(event).await;
        }

        let remaining = store.event_count().await;
        let indexed = store.events_by_agent("agent-1").await.len();
        assert_eq!(indexed, remaining, "by_agent must only reference live bodies");

        let state = store.state.read().await;
        assert!(
            state.by_agent.get("agent-1").map(|ids| ids.len()).unwrap_or(0) <= remaining,
            "by_agent must not retain ids for evicted bodies"
        );
    }
}
