//! The single append entry point (C4 Logger, spec.md §4.4): serializes chain
//! appends under one mutex, persists into the Store, then fans the appended
//! event out to an optional exporter without ever awaiting it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use kontext_core::{ChainVerification, DigestChain, Event, EventType, LogRejection, PendingEvent};
use kontext_store::{EventStore, StorageAdapter};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::exporter::ExportQueue;

/// Convenience input for callers that don't already hold a [`PendingEvent`]
/// (the façade's `log_action`/`log_reasoning` helpers build one of these and
/// let [`Logger::log_input`] fill in id/timestamp/correlation_id).
pub struct LogInput {
    pub project_id: String,
    pub agent_id: String,
    pub session_id: Option<Uuid>,
    pub correlation_id: Option<String>,
    pub event_type: EventType,
    pub description: String,
    pub payload: kontext_core::EventPayload,
}

pub struct Logger<A: StorageAdapter + ?Sized> {
    chain: Mutex<DigestChain>,
    store: Arc<EventStore<A>>,
    export_queue: Option<ExportQueue>,
}

impl<A: StorageAdapter + ?Sized> Logger<A> {
    pub fn new(store: Arc<EventStore<A>>, export_queue: Option<ExportQueue>) -> Self {
        Self { chain: Mutex::new(DigestChain::new()), store, export_queue }
    }

    /// Rehydrates the chain from a previously exported state, e.g. after
    /// [`EventStore::restore`] has repopulated the store. The caller is
    /// responsible for ensuring `export` reflects the same events already in
    /// `store` (the façade's `restore()` does this by construction).
    pub async fn replace_chain(&self, chain: DigestChain) {
        *self.chain.lock().await = chain;
    }

    pub async fn terminal_digest(&self) -> String {
        self.chain.lock().await.terminal().to_string()
    }

    pub async fn export_chain(&self) -> kontext_core::ChainExport {
        self.chain.lock().await.export()
    }

    pub async fn verify(&self) -> ChainVerification {
        let events = self.store.all_events().await;
        DigestChain::verify(&events)
    }

    pub async fn dropped_exports(&self) -> u64 {
        self.export_queue.as_ref().map(|q| q.dropped()).unwrap_or(0)
    }

    /// Builds a [`PendingEvent`] from a [`LogInput`], filling in id/timestamp
    /// and, if absent, a fresh correlation id, then logs it.
    pub async fn log_input(&self, input: LogInput) -> Result<Event, LogRejection> {
        let pending = PendingEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            project_id: input.project_id,
            agent_id: input.agent_id,
            session_id: input.session_id,
            correlation_id: input.correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            event_type: input.event_type,
            description: input.description,
            payload: input.payload,
        };
        self.log(pending).await
    }
}

#[async_trait]
impl<A: StorageAdapter + ?Sized> kontext_core::EventLogger for Logger<A> {
    async fn log(&self, pending: PendingEvent) -> Result<Event, LogRejection> {
        // Every event but a session's own opening event must belong to a
        // currently-active session (spec.md §5 ordering guarantee: nothing
        // may follow a session-end event under the same session_id).
        if let Some(session_id) = pending.session_id {
            if pending.event_type != EventType::SessionStart {
                let status = self.store.session_status(session_id, Utc::now()).await;
                if status != Some(kontext_core::SessionStatus::Active) {
                    return Err(LogRejection::SessionNotActive { session_id });
                }
            }
        }

        let event = {
            let mut chain = self.chain.lock().await;
            chain.append(pending)?
        };

        self.store.add_event(event.clone()).await;

        if let Some(queue) = &self.export_queue {
            queue.try_enqueue(event.clone());
        }

        Ok(event)
    }
}
