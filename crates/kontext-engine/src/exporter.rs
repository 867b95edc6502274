//! Event Exporter contract (external collaborator, spec.md §6) and the
//! bounded, drop-newest fan-out queue the Logger feeds it through.
//!
//! The Logger never awaits an exporter on the hot path (spec.md §4.4 step
//! 6: "fire-and-forget... failure must not affect the return value"). A
//! single background task owns the exporter and drains a bounded channel;
//! `try_send` from the append path means a slow or wedged exporter can
//! never block an appender, matching the drop-newest queue spec.md §9
//! prescribes for anomaly subscriber fan-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kontext_core::Event;
use tokio::sync::mpsc;

/// Result of a single export call.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub success: bool,
    pub exported_count: usize,
    pub error: Option<String>,
}

/// The external Event Exporter collaborator (spec.md §6). Implementations
/// own whatever transport (HTTP webhook, on-chain anchor, message queue)
/// sits outside this crate's scope.
#[async_trait]
pub trait EventExporter: Send + Sync {
    async fn export(&self, events: &[Event]) -> ExportOutcome;
    async fn flush(&self);
    async fn shutdown(&self);
}

/// Spawns the background task that owns `exporter` and drains the bounded
/// channel the Logger feeds. Returns a handle the Logger uses to enqueue
/// events without ever awaiting the exporter itself.
pub struct ExportQueue {
    sender: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl ExportQueue {
    pub fn spawn(exporter: Arc<dyn EventExporter>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Event>(capacity);
        let dropped = Arc::new(AtomicU64::new(0));

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let outcome = exporter.export(std::slice::from_ref(&event)).await;
                if !outcome.success {
                    tracing::warn!(
                        event_id = %event.id,
                        error = outcome.error.as_deref().unwrap_or("unknown"),
                        "event exporter failed; continuing"
                    );
                }
            }
        });

        Self { sender, dropped }
    }

    /// Best-effort enqueue — never blocks. A full queue drops the newest
    /// event and increments the dropped counter rather than backing up the
    /// append path.
    pub fn try_enqueue(&self, event: Event) {
        if self.sender.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("export queue full; dropped newest event");
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
