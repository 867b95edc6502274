//! Task records — a lightweight derived view over `action` events.
//!
//! spec.md's Data Model (§3) never defines a standalone "task" entity, but
//! §4.3 and §6 both name `kontext:tasks` as one of the Store's six typed
//! collections, and the Trust Scorer (§4.12) needs a "confirmed/failed task
//! ratio" factor. We resolve this the way the rest of the spec treats
//! derived views (`transactions` is explicitly "events-with-index"): a task
//! is the subset of `action` events, with status read out of
//! `payload.metadata["status"]` (`"confirmed"` | `"failed"`, default
//! `"pending"`). See DESIGN.md for the recorded rationale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kontext_core::{Event, EventPayload};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub agent_id: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Derive a task record from an `action` event, or `None` for any other
    /// event type.
    pub fn from_event(event: &Event) -> Option<Self> {
        let EventPayload::Action { metadata, .. } = &event.payload else {
            return None;
        };
        let status = match metadata.get("status").and_then(|v| v.as_str()) {
            Some("confirmed") => TaskStatus::Confirmed,
            Some("failed") => TaskStatus::Failed,
            _ => TaskStatus::Pending,
        };
        Some(Self {
            task_id: event.id,
            agent_id: event.agent_id.clone(),
            status,
            created_at: event.timestamp,
        })
    }
}
