//! Anomaly Engine (C7) — a deterministic rule bank evaluated in a fixed
//! order over an agent's recent transaction history, emitting `anomaly`
//! events through the Logger and fanning them out to subscribers over a
//! bounded, drop-newest queue (spec.md §9 "Asynchronous notification").

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Timelike, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use kontext_core::{Event, EventLogger, EventPayload, EventType, PendingEvent, Severity};
use kontext_store::{EventStore, StorageAdapter};

use crate::error::RulesError;

/// Tunables for the six rules in spec.md §4.7. No defaults are asserted here
/// beyond what spec.md itself calls "configured" — a deployment picks these.
#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    pub max_amount: Decimal,
    pub max_frequency_per_hour: usize,
    pub off_hours: HashSet<u32>,
    pub min_interval_seconds: i64,
    pub structuring_threshold: Decimal,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            max_amount: Decimal::from(10_000),
            max_frequency_per_hour: 20,
            off_hours: (0..6).collect(),
            min_interval_seconds: 2,
            structuring_threshold: Decimal::from(1_000),
        }
    }
}

/// What a rule observes in order to decide whether it fires. Built fresh for
/// every `evaluate_transaction` call from the agent's stored transaction
/// history plus the candidate transaction under review.
pub struct AnomalyContext<'a> {
    pub agent_id: &'a str,
    pub to: &'a str,
    pub amount: Decimal,
    pub now: DateTime<Utc>,
    pub prior_transactions: &'a [Event],
}

/// A rule's verdict when it fires.
pub struct AnomalyFinding {
    pub rule: &'static str,
    pub severity: Severity,
    pub data: serde_json::Value,
}

pub trait AnomalyRule: Send + Sync {
    fn evaluate(&self, ctx: &AnomalyContext<'_>) -> Option<AnomalyFinding>;
}

struct UnusualAmount {
    max_amount: Decimal,
}
impl AnomalyRule for UnusualAmount {
    fn evaluate(&self, ctx: &AnomalyContext<'_>) -> Option<AnomalyFinding> {
        (ctx.amount > self.max_amount).then(|| AnomalyFinding {
            rule: "unusual_amount",
            severity: Severity::High,
            data: json!({ "amount": ctx.amount, "max_amount": self.max_amount }),
        })
    }
}

struct FrequencySpike {
    max_frequency_per_hour: usize,
}
impl AnomalyRule for FrequencySpike {
    fn evaluate(&self, ctx: &AnomalyContext<'_>) -> Option<AnomalyFinding> {
        let one_hour_ago = ctx.now - Duration::hours(1);
        let count_including_this = ctx
            .prior_transactions
            .iter()
            .filter(|e| e.timestamp >= one_hour_ago)
            .count()
            + 1;
        (count_including_this > self.max_frequency_per_hour).then(|| AnomalyFinding {
            rule: "frequency_spike",
            severity: Severity::Medium,
            data: json!({ "transactions_last_hour": count_including_this }),
        })
    }
}

struct NewDestination;
impl AnomalyRule for NewDestination {
    fn evaluate(&self, ctx: &AnomalyContext<'_>) -> Option<AnomalyFinding> {
        let seen_before = ctx.prior_transactions.iter().any(|e| match &e.payload {
            EventPayload::Transaction { to, .. } => to == ctx.to,
            _ => false,
        });
        (!seen_before).then(|| AnomalyFinding {
            rule: "new_destination",
            severity: Severity::Low,
            data: json!({ "to": ctx.to }),
        })
    }
}

struct OffHours {
    off_hours: HashSet<u32>,
}
impl AnomalyRule for OffHours {
    fn evaluate(&self, ctx: &AnomalyContext<'_>) -> Option<AnomalyFinding> {
        let hour = ctx.now.hour();
        self.off_hours.contains(&hour).then(|| AnomalyFinding {
            rule: "off_hours",
            severity: Severity::Low,
            data: json!({ "utc_hour": hour }),
        })
    }
}

struct RapidSuccession {
    min_interval_seconds: i64,
}
impl AnomalyRule for RapidSuccession {
    fn evaluate(&self, ctx: &AnomalyContext<'_>) -> Option<AnomalyFinding> {
        let last = ctx.prior_transactions.iter().map(|e| e.timestamp).max()?;
        let interval = ctx.now - last;
        (interval < Duration::seconds(self.min_interval_seconds)).then(|| AnomalyFinding {
            rule: "rapid_succession",
            severity: Severity::Medium,
            data: json!({ "interval_seconds": interval.num_milliseconds() as f64 / 1000.0 }),
        })
    }
}

struct RoundAmount {
    structuring_threshold: Decimal,
}
impl AnomalyRule for RoundAmount {
    fn evaluate(&self, ctx: &AnomalyContext<'_>) -> Option<AnomalyFinding> {
        let is_round_hundred = ctx.amount >= self.structuring_threshold && ctx.amount % Decimal::from(100) == Decimal::ZERO;
        is_round_hundred.then(|| AnomalyFinding {
            rule: "round_amount",
            severity: Severity::Medium,
            data: json!({ "amount": ctx.amount }),
        })
    }
}

fn rule_bank(config: &AnomalyConfig) -> Vec<Box<dyn AnomalyRule>> {
    vec![
        Box::new(UnusualAmount { max_amount: config.max_amount }),
        Box::new(FrequencySpike { max_frequency_per_hour: config.max_frequency_per_hour }),
        Box::new(NewDestination),
        Box::new(OffHours { off_hours: config.off_hours.clone() }),
        Box::new(RapidSuccession { min_interval_seconds: config.min_interval_seconds }),
        Box::new(RoundAmount { structuring_threshold: config.structuring_threshold }),
    ]
}

/// Rule bank plus subscriber fan-out (C7). Holds no chain/store ownership of
/// its own — every fired anomaly still goes through the caller's `EventLogger`.
pub struct AnomalyEngine<A: StorageAdapter + ?Sized> {
    store: Arc<EventStore<A>>,
    rules: Vec<Box<dyn AnomalyRule>>,
    subscribers: Mutex<Vec<tokio::sync::mpsc::Sender<Event>>>,
    dropped: AtomicU64,
}

impl<A: StorageAdapter + ?Sized> AnomalyEngine<A> {
    pub fn new(store: Arc<EventStore<A>>, config: AnomalyConfig) -> Self {
        Self {
            store,
            rules: rule_bank(&config),
            subscribers: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber; anomaly events fired after the call are
    /// delivered on the returned receiver. The producer side never blocks —
    /// a full channel drops the newest notification and increments the
    /// dropped counter rather than backing up the evaluation path.
    pub fn subscribe(&self, capacity: usize) -> tokio::sync::mpsc::Receiver<Event> {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity);
        self.subscribers.lock().expect("subscriber list lock").push(tx);
        rx
    }

    pub fn dropped_notifications(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn notify_subscribers(&self, event: &Event) {
        let subscribers = self.subscribers.lock().expect("subscriber list lock");
        for subscriber in subscribers.iter() {
            if subscriber.try_send(event.clone()).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Evaluate all six rules against `agent_id`'s transaction history for
    /// a candidate transaction, logging one `anomaly` event per rule that
    /// fires, in rule-bank order, then notifying subscribers for each.
    #[allow(clippy::too_many_arguments)]
    pub async fn evaluate_transaction(
        &self,
        project_id: &str,
        agent_id: &str,
        session_id: Option<Uuid>,
        to: &str,
        amount: Decimal,
        logger: &dyn EventLogger,
    ) -> Result<Vec<Event>, RulesError> {
        let prior_transactions: Vec<Event> = self
            .store
            .events_by_agent(agent_id)
            .await
            .into_iter()
            .filter(|e| e.event_type == EventType::Transaction)
            .collect();

        let ctx = AnomalyContext {
            agent_id,
            to,
            amount,
            now: Utc::now(),
            prior_transactions: &prior_transactions,
        };

        let mut emitted = Vec::new();
        for rule in &self.rules {
            let Some(finding) = rule.evaluate(&ctx) else { continue };
            let pending = PendingEvent {
                id: Uuid::new_v4(),
                timestamp: ctx.now,
                project_id: project_id.to_string(),
                agent_id: agent_id.to_string(),
                session_id,
                correlation_id: Uuid::new_v4().to_string(),
                event_type: EventType::Anomaly,
                description: format!("anomaly rule {} fired", finding.rule),
                payload: EventPayload::Anomaly {
                    rule: finding.rule.to_string(),
                    severity: finding.severity,
                    data: finding.data,
                },
            };
            let event = logger.log(pending).await?;
            tracing::warn!(agent_id, rule = finding.rule, severity = ?finding.severity, "anomaly detected");
            self.notify_subscribers(&event);
            emitted.push(event);
        }
        Ok(emitted)
    }
}
