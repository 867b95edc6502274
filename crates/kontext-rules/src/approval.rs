//! Approval Engine (C8) — policy evaluator producing time-boxed approval
//! requests. Pending requests live only in this engine's own map; they are
//! never chained (spec.md §3: "Approval requests live in the Approval
//! Engine only (not chained) and are garbage-collected on expiry").

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use kontext_core::Severity;

use crate::error::RulesError;

/// One enabled policy, carrying its own typed parameters.
#[derive(Debug, Clone)]
pub enum ApprovalPolicy {
    AmountThreshold { threshold: Decimal },
    LowTrustScore { min_score: u8 },
    AnomalyDetected { min_severity: Severity },
    NewDestination,
    Manual,
}

impl ApprovalPolicy {
    fn label(&self) -> &'static str {
        match self {
            ApprovalPolicy::AmountThreshold { .. } => "amount-threshold",
            ApprovalPolicy::LowTrustScore { .. } => "low-trust-score",
            ApprovalPolicy::AnomalyDetected { .. } => "anomaly-detected",
            ApprovalPolicy::NewDestination => "new-destination",
            ApprovalPolicy::Manual => "manual",
        }
    }

    fn evidence_keys(&self) -> &'static [&'static str] {
        match self {
            ApprovalPolicy::AmountThreshold { .. } => &["amount_justification"],
            ApprovalPolicy::LowTrustScore { .. } => &["reviewer_override"],
            ApprovalPolicy::AnomalyDetected { .. } => &["anomaly_explanation"],
            ApprovalPolicy::NewDestination => &["destination_verification"],
            ApprovalPolicy::Manual => &["manual_review_notes"],
        }
    }
}

/// The action under review, as handed to [`ApprovalEngine::evaluate`].
#[derive(Debug, Clone)]
pub struct EvaluateInput {
    pub agent_id: String,
    pub amount: Decimal,
    pub trust_score: u8,
    pub anomaly_severities: Vec<Severity>,
    pub is_new_destination: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecisionRecord {
    pub decision: ApprovalDecision,
    pub evidence: Value,
    pub reason: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: Uuid,
    pub agent_id: String,
    pub triggered_policies: Vec<String>,
    pub required_evidence: Vec<String>,
    pub risk_score: u32,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decision: Option<ApprovalDecisionRecord>,
}

impl ApprovalRequest {
    /// Lazy expiry: a request only flips to `expired` when read past its
    /// deadline, never via a background timer (spec.md §5).
    pub fn effective_status(&self, now: DateTime<Utc>) -> ApprovalStatus {
        if self.status == ApprovalStatus::Pending && now >= self.expires_at {
            ApprovalStatus::Expired
        } else {
            self.status
        }
    }
}

/// Holds enabled policies and the TTL applied to every request it creates.
pub struct ApprovalEngine {
    policies: Vec<ApprovalPolicy>,
    ttl: Duration,
    requests: RwLock<HashMap<Uuid, ApprovalRequest>>,
}

impl ApprovalEngine {
    pub fn new(policies: Vec<ApprovalPolicy>, ttl: Duration) -> Self {
        Self { policies, ttl, requests: RwLock::new(HashMap::new()) }
    }

    /// Run every enabled policy against `input`. Returns `None` if nothing
    /// triggers. Otherwise creates and stores a pending request with
    /// `risk_score = min(100, 25*triggered_count + 20*amount + 30*low_trust +
    /// 25*anomaly)` (spec.md §4.8), where the three named terms are 0/1
    /// flags for whether that specific policy category triggered.
    pub async fn evaluate(&self, input: &EvaluateInput) -> Option<ApprovalRequest> {
        let mut triggered_labels = Vec::new();
        let mut evidence_keys = BTreeSet::new();
        let mut amount_triggered = false;
        let mut low_trust_triggered = false;
        let mut anomaly_triggered = false;

        for policy in &self.policies {
            let fires = match policy {
                ApprovalPolicy::AmountThreshold { threshold } => {
                    let fires = input.amount > *threshold;
                    amount_triggered |= fires;
                    fires
                }
                ApprovalPolicy::LowTrustScore { min_score } => {
                    let fires = input.trust_score < *min_score;
                    low_trust_triggered |= fires;
                    fires
                }
                ApprovalPolicy::AnomalyDetected { min_severity } => {
                    let fires = input.anomaly_severities.iter().any(|s| s >= min_severity);
                    anomaly_triggered |= fires;
                    fires
                }
                ApprovalPolicy::NewDestination => input.is_new_destination,
                ApprovalPolicy::Manual => true,
            };
            if fires {
                triggered_labels.push(policy.label().to_string());
                evidence_keys.extend(policy.evidence_keys().iter().map(|k| k.to_string()));
            }
        }

        if triggered_labels.is_empty() {
            return None;
        }

        let risk_score = (25 * triggered_labels.len() as u32
            + 20 * amount_triggered as u32
            + 30 * low_trust_triggered as u32
            + 25 * anomaly_triggered as u32)
            .min(100);

        let now = Utc::now();
        let request = ApprovalRequest {
            request_id: Uuid::new_v4(),
            agent_id: input.agent_id.clone(),
            triggered_policies: triggered_labels,
            required_evidence: evidence_keys.into_iter().collect(),
            risk_score,
            status: ApprovalStatus::Pending,
            created_at: now,
            expires_at: now + self.ttl,
            decision: None,
        };

        self.requests.write().await.insert(request.request_id, request.clone());
        tracing::info!(request_id = %request.request_id, risk_score, "approval request created");
        Some(request)
    }

    pub async fn get(&self, request_id: Uuid) -> Option<ApprovalRequest> {
        let requests = self.requests.read().await;
        requests.get(&request_id).map(|r| {
            let mut r = r.clone();
            r.status = r.effective_status(Utc::now());
            r
        })
    }

    /// Transition a pending request to `approved` or `rejected`. No chain
    /// event is emitted here; the caller decides whether the action this
    /// approval gates gets logged (spec.md §4.8).
    pub async fn submit_decision(
        &self,
        request_id: Uuid,
        decision: ApprovalDecision,
        evidence: Option<Value>,
        reason: Option<String>,
    ) -> Result<ApprovalRequest, RulesError> {
        let mut requests = self.requests.write().await;
        let request = requests.get_mut(&request_id).ok_or(RulesError::ApprovalNotFound { request_id })?;

        let now = Utc::now();
        match request.effective_status(now) {
            ApprovalStatus::Pending => {}
            ApprovalStatus::Expired => {
                request.status = ApprovalStatus::Expired;
                return Err(RulesError::ApprovalExpired { request_id });
            }
            _ => return Err(RulesError::ApprovalNotPending { request_id }),
        }

        if decision == ApprovalDecision::Approved {
            let evidence_value = evidence.clone().unwrap_or(Value::Null);
            let missing: Vec<String> = request
                .required_evidence
                .iter()
                .filter(|key| evidence_value.get(key.as_str()).map(|v| v.is_null()).unwrap_or(true))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(RulesError::InsufficientEvidence { missing });
            }
        }

        request.status = match decision {
            ApprovalDecision::Approved => ApprovalStatus::Approved,
            ApprovalDecision::Rejected => ApprovalStatus::Rejected,
        };
        request.decision = Some(ApprovalDecisionRecord {
            decision,
            evidence: evidence.unwrap_or(Value::Null),
            reason,
            decided_at: now,
        });
        tracing::info!(request_id = %request_id, status = ?request.status, "approval decision submitted");
        Ok(request.clone())
    }
}
