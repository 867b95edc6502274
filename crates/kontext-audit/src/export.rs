//! Audit export (C9, first half) — renders the Store's current state as a
//! portable, independently-verifiable bundle (spec.md §6's bit-exact field
//! set) in either JSON or CSV form.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use kontext_core::{Checkpoint, ChainExport, ChainLink, Event, EventType, Session};
use kontext_store::{EventStore, StorageAdapter};

use crate::error::AuditError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Query narrowing applied before rendering. `None` means "don't filter on
/// this dimension."
#[derive(Debug, Clone, Default)]
pub struct ExportFilters {
    pub agent_id: Option<String>,
    pub event_type: Option<EventType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl ExportFilters {
    fn matches(&self, event: &Event) -> bool {
        if let Some(agent_id) = &self.agent_id {
            if &event.agent_id != agent_id {
                return false;
            }
        }
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// `chain` sub-object of the bit-exact JSON bundle shape (spec.md §6).
#[derive(Debug, Clone, Serialize)]
pub struct ChainSnapshot {
    pub genesis_hash: String,
    pub links: Vec<ChainLink>,
    pub terminal_digest: String,
}

/// The canonical JSON export bundle, field-for-field per spec.md §6.
#[derive(Debug, Clone, Serialize)]
pub struct JsonBundle {
    pub format: &'static str,
    pub exported_at: DateTime<Utc>,
    pub record_count: usize,
    pub terminal_digest: String,
    pub chain: ChainSnapshot,
    pub events: Vec<Event>,
    pub sessions: Vec<Session>,
    pub checkpoints: Vec<Checkpoint>,
}

/// The caller-facing result of [`export`]: `format`/`exported_at`/
/// `record_count`/`terminal_digest` at the top level per spec.md §4.9,
/// `data` carrying the format-specific payload (a JSON value for
/// `Json`, a CSV text blob wrapped as a JSON string for `Csv`).
#[derive(Debug, Clone)]
pub struct AuditExport {
    pub format: ExportFormat,
    pub exported_at: DateTime<Utc>,
    pub record_count: usize,
    pub data: Value,
    pub terminal_digest: String,
}

fn event_row(event: &Event) -> [String; 13] {
    let (tx_hash, chain, token, amount, from, to) = match &event.payload {
        kontext_core::EventPayload::Transaction { tx_hash, chain, token, amount, from, to, .. } => (
            tx_hash.clone(),
            chain.clone(),
            token.clone(),
            amount.to_string(),
            from.clone(),
            to.clone(),
        ),
        _ => (String::new(), String::new(), String::new(), String::new(), String::new(), String::new()),
    };
    [
        event.id.to_string(),
        event.timestamp.to_rfc3339(),
        format!("{:?}", event.event_type),
        event.agent_id.clone(),
        event.session_id.map(|s| s.to_string()).unwrap_or_default(),
        event.digest.clone(),
        event.prior_digest.clone(),
        tx_hash,
        chain,
        token,
        amount,
        from,
        to,
    ]
}

fn events_to_csv(events: &[Event]) -> Result<String, AuditError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "id",
        "timestamp",
        "event_type",
        "agent_id",
        "session_id",
        "digest",
        "prior_digest",
        "tx_hash",
        "chain",
        "token",
        "amount",
        "from",
        "to",
    ])?;
    for event in events {
        writer.write_record(event_row(event))?;
    }
    let bytes = writer.into_inner().map_err(|e| AuditError::Csv(e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Render the Store's current state (after `filters`) in `format`.
/// `chain_export` supplies the chain snapshot and terminal digest (JSON
/// form only reads `genesis`/`terminal_digest`/`links`; the caller owns the
/// live `DigestChain` this is exported from).
pub async fn export<A: StorageAdapter + ?Sized>(
    store: &EventStore<A>,
    chain_export: &ChainExport,
    format: ExportFormat,
    filters: &ExportFilters,
) -> Result<AuditExport, AuditError> {
    let events: Vec<Event> = store.all_events().await.into_iter().filter(|e| filters.matches(e)).collect();
    let record_count = events.len();
    let exported_at = Utc::now();
    let terminal_digest = chain_export.terminal_digest.clone();

    let data = match format {
        ExportFormat::Json => {
            let bundle = JsonBundle {
                format: "json",
                exported_at,
                record_count,
                terminal_digest: terminal_digest.clone(),
                chain: ChainSnapshot {
                    genesis_hash: chain_export.genesis.clone(),
                    links: chain_export.links.clone(),
                    terminal_digest: chain_export.terminal_digest.clone(),
                },
                events,
                sessions: store.all_sessions().await,
                checkpoints: store.all_checkpoints().await,
            };
            serde_json::to_value(bundle).expect("JsonBundle always serializes")
        }
        ExportFormat::Csv => Value::String(events_to_csv(&events)?),
    };

    tracing::info!(record_count, format = ?format, "audit export rendered");

    Ok(AuditExport { format, exported_at, record_count, data, terminal_digest })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kontext_core::{DigestChain, EventPayload, PendingEvent};
    use kontext_store::backend::MemoryAdapter;
    use kontext_store::StoreLimits;
    use uuid::Uuid;

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
            payload: EventPayload::Action { action_type: "noop".into(), metadata: serde_json::json!({}) },
        }
    }

    #[tokio::test]
    async fn json_export_carries_full_bundle_shape() {
        let store = EventStore::new(std::sync::Arc::new(MemoryAdapter::new()), StoreLimits::default());
        let mut chain = DigestChain::new();
        for _ in 0..2 {
            let event = chain.append(action_pending("agent-1")).unwrap();
            store.add_event(event).await;
        }
        let result = export(&store, &chain.export(), ExportFormat::Json, &ExportFilters::default()).await.unwrap();
        assert_eq!(result.record_count, 2);
        assert_eq!(result.terminal_digest, chain.terminal());
        assert!(result.data.get("events").unwrap().as_array().unwrap().len() == 2);
        assert!(result.data.get("chain").is_some());
    }

    #[tokio::test]
    async fn csv_export_has_one_header_plus_one_row_per_event() {
        let store = EventStore::new(std::sync::Arc::new(MemoryAdapter::new()), StoreLimits::default());
        let mut chain = DigestChain::new();
        let event = chain.append(action_pending("agent-1")).unwrap();
        store.add_event(event).await;

        let result = export(&store, &chain.export(), ExportFormat::Csv, &ExportFilters::default()).await.unwrap();
        let csv_text = result.data.as_str().unwrap();
        assert_eq!(csv_text.lines().count(), 2);
    }

    #[tokio::test]
    async fn filter_by_agent_id_narrows_export() {
        let store = EventStore::new(std::sync::Arc::new(MemoryAdapter::new()), StoreLimits::default());
        let mut chain = DigestChain::new();
        store.add_event(chain.append(action_pending("agent-1")).unwrap()).await;
        store.add_event(chain.append(action_pending("agent-2")).unwrap()).await;

        let filters = ExportFilters { agent_id: Some("agent-1".into()), ..ExportFilters::default() };
        let result = export(&store, &chain.export(), ExportFormat::Json, &filters).await.unwrap();
        assert_eq!(result.record_count, 1);
    }
}
