//! Trust Scorer (C12) — a deterministic scalar in `[0, 100]` per agent,
//! combining five bounded factors over the Store with fixed weights summing
//! to 1 (spec.md §4.12). Pure function of the Store's current state; it
//! takes no lock of its own beyond the Store's own read locks.

use chrono::{Duration, Utc};

use kontext_core::{EventPayload, EventType, Severity};
use kontext_store::{EventStore, StorageAdapter, TaskStatus};

const WEIGHT_ACTION_COUNT: f64 = 0.15;
const WEIGHT_TASK_RATIO: f64 = 0.25;
const WEIGHT_ANOMALY: f64 = 0.20;
const WEIGHT_TX_CONSISTENCY: f64 = 0.15;
const WEIGHT_COMPLIANCE: f64 = 0.25;

fn bound(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// action_count factor: more observed actions raises confidence, saturating
/// at 50 actions.
fn action_count_factor(count: usize) -> f64 {
    bound(count as f64 * 2.0)
}

/// confirmed/failed task ratio; with no decided tasks yet, assume neutral
/// trust (100) rather than penalizing a quiet agent.
fn task_ratio_factor(confirmed: usize, failed: usize) -> f64 {
    let decided = confirmed + failed;
    if decided == 0 {
        100.0
    } else {
        bound(confirmed as f64 / decided as f64 * 100.0)
    }
}

/// anomaly count factor: each anomaly in the scoring window costs 10 points.
fn anomaly_factor(anomaly_count: usize) -> f64 {
    bound(100.0 - anomaly_count as f64 * 10.0)
}

/// transaction consistency factor: the coefficient of variation of recent
/// transaction amounts, inverted (low variance → high score). Fewer than two
/// transactions carry no variance signal, so the factor defaults to neutral.
fn transaction_consistency_factor(amounts: &[f64]) -> f64 {
    if amounts.len() < 2 {
        return 100.0;
    }
    let mean = amounts.iter().sum::<f64>() / amounts.len() as f64;
    if mean == 0.0 {
        return 100.0;
    }
    let variance = amounts.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / amounts.len() as f64;
    let coefficient_of_variation = variance.sqrt() / mean;
    bound(100.0 - coefficient_of_variation * 100.0)
}

/// compliance adherence factor: fraction of recent verify-results that were
/// compliant. With no verify-results yet, default to neutral trust.
fn compliance_adherence_factor(compliant_count: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        bound(compliant_count as f64 / total as f64 * 100.0)
    }
}

/// Deterministic scalar trust score in `[0, 100]` for `agent_id`, computed
/// entirely from aggregates over the Store's current snapshot.
pub async fn trust_score<A: StorageAdapter + ?Sized>(store: &EventStore<A>, agent_id: &str) -> u8 {
    let tasks = store.tasks_for_agent(agent_id).await;
    let confirmed = tasks.iter().filter(|t| t.status == TaskStatus::Confirmed).count();
    let failed = tasks.iter().filter(|t| t.status == TaskStatus::Failed).count();

    let anomalies = store
        .recent_anomalies_for_agent(agent_id, Utc::now() - Duration::days(7))
        .await;

    let agent_events = store.events_by_agent(agent_id).await;
    let amounts: Vec<f64> = agent_events
        .iter()
        .filter(|e| e.event_type == EventType::Transaction)
        .filter_map(|e| match &e.payload {
            EventPayload::Transaction { amount, .. } => amount.to_string().parse::<f64>().ok(),
            _ => None,
        })
        .collect();

    let verify_results: Vec<bool> = agent_events
        .iter()
        .filter(|e| e.event_type == EventType::VerifyResult)
        .filter_map(|e| match &e.payload {
            EventPayload::VerifyResult { compliant, .. } => Some(*compliant),
            _ => None,
        })
        .collect();
    let compliant_count = verify_results.iter().filter(|c| **c).count();

    let weighted = action_count_factor(tasks.len()) * WEIGHT_ACTION_COUNT
        + task_ratio_factor(confirmed, failed) * WEIGHT_TASK_RATIO
        + anomaly_factor(anomalies.len()) * WEIGHT_ANOMALY
        + transaction_consistency_factor(&amounts) * WEIGHT_TX_CONSISTENCY
        + compliance_adherence_factor(compliant_count, verify_results.len()) * WEIGHT_COMPLIANCE;

    bound(weighted).round() as u8
}

/// Used by the compliance certificate (C9) to roll a per-agent overall
/// status out of the score and the most recent verdict severity.
pub fn status_band(score: u8, worst_recent_severity: Option<Severity>) -> &'static str {
    match worst_recent_severity {
        Some(Severity::Critical) => "non-compliant",
        Some(Severity::High) if score < 60 => "non-compliant",
        Some(Severity::High) => "review-required",
        _ if score < 40 => "review-required",
        _ => "compliant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_count_saturates_at_fifty() {
        assert_eq!(action_count_factor(0), 0.0);
        assert_eq!(action_count_factor(50), 100.0);
        assert_eq!(action_count_factor(1000), 100.0);
    }

    #[test]
    fn task_ratio_defaults_neutral_with_no_decided_tasks() {
        assert_eq!(task_ratio_factor(0, 0), 100.0);
        assert_eq!(task_ratio_factor(1, 1), 50.0);
        assert_eq!(task_ratio_factor(3, 0), 100.0);
    }

    #[test]
    fn transaction_consistency_rewards_stable_amounts() {
        let stable = vec![100.0, 100.0, 100.0];
        let volatile = vec![1.0, 500.0, 10.0];
        assert!(transaction_consistency_factor(&stable) > transaction_consistency_factor(&volatile));
    }

    #[test]
    fn status_band_escalates_with_critical_severity() {
        assert_eq!(status_band(95, Some(Severity::Critical)), "non-compliant");
        assert_eq!(status_band(95, None), "compliant");
        assert_eq!(status_band(30, None), "review-required");
    }
}
