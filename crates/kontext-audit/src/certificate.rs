//! Compliance certificate (C9, second half) — a self-attesting per-agent
//! summary document, tamper-evident via its own `content_hash`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use kontext_core::{canonical_bytes_of, ChainVerification, EventType};
use kontext_compliance::{status_band, trust_score};
use kontext_store::{EventStore, StorageAdapter};

use crate::error::AuditError;

/// Time window narrowing applied to the event counts a certificate rolls
/// up. `None` on either bound means unbounded in that direction.
#[derive(Debug, Clone, Default)]
pub struct CertificateRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl CertificateRange {
    fn contains(&self, at: DateTime<Utc>) -> bool {
        self.since.map(|s| at >= s).unwrap_or(true) && self.until.map(|u| at <= u).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OverallStatus {
    Compliant,
    ReviewRequired,
    NonCompliant,
}

/// Everything the certificate asserts, serialized in a fixed field order so
/// `content_hash` is reproducible (spec.md Testable Property 10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceCertificate {
    pub agent_id: String,
    pub issued_at: DateTime<Utc>,
    pub range_since: Option<DateTime<Utc>>,
    pub range_until: Option<DateTime<Utc>>,
    pub action_count: usize,
    pub transaction_count: usize,
    pub anomaly_count: usize,
    pub verify_result_count: usize,
    pub compliant_verify_count: usize,
    pub trust_score: u8,
    pub terminal_digest: String,
    pub chain_valid: bool,
    pub overall_status: OverallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_excerpts: Option<Vec<String>>,
    pub content_hash: String,
}

/// Everything but `content_hash`, canonicalized and hashed to produce it.
#[derive(Serialize)]
struct CertificateBody<'a> {
    agent_id: &'a str,
    issued_at: DateTime<Utc>,
    range_since: Option<DateTime<Utc>>,
    range_until: Option<DateTime<Utc>>,
    action_count: usize,
    transaction_count: usize,
    anomaly_count: usize,
    verify_result_count: usize,
    compliant_verify_count: usize,
    trust_score: u8,
    terminal_digest: &'a str,
    chain_valid: bool,
    overall_status: OverallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_excerpts: &'a Option<Vec<String>>,
}

fn content_hash(body: &CertificateBody<'_>) -> Result<String, AuditError> {
    let canonical = canonical_bytes_of(body)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

/// Build and self-attest a compliance certificate for `agent_id`.
/// `chain_outcome` comes from the caller's live `DigestChain::verify` (or a
/// restored-chain rebuild) so the certificate reflects this process's own
/// check, not a cached flag.
pub async fn compliance_certificate<A: StorageAdapter + ?Sized>(
    store: &EventStore<A>,
    agent_id: &str,
    range: CertificateRange,
    include_reasoning: bool,
    terminal_digest: String,
    chain_outcome: &ChainVerification,
) -> Result<ComplianceCertificate, AuditError> {
    let events = store.events_by_agent(agent_id).await;
    let in_range: Vec<_> = events.iter().filter(|e| range.contains(e.timestamp)).collect();

    let action_count = in_range.iter().filter(|e| e.event_type == EventType::Action).count();
    let transaction_count = in_range.iter().filter(|e| e.event_type == EventType::Transaction).count();
    let anomaly_count = in_range.iter().filter(|e| e.event_type == EventType::Anomaly).count();

    let verify_results: Vec<_> = in_range
        .iter()
        .filter(|e| e.event_type == EventType::VerifyResult)
        .collect();
    let verify_result_count = verify_results.len();
    let compliant_verify_count = verify_results
        .iter()
        .filter(|e| matches!(&e.payload, kontext_core::EventPayload::VerifyResult { compliant, .. } if *compliant))
        .count();

    let worst_recent_severity = verify_results
        .iter()
        .filter_map(|e| match &e.payload {
            kontext_core::EventPayload::VerifyResult { compliant, risk_level, .. } if !compliant => Some(*risk_level),
            _ => None,
        })
        .max();

    let score = trust_score(store, agent_id).await;
    let chain_valid = chain_outcome.valid;
    let status_label = if !chain_valid {
        "non-compliant"
    } else {
        status_band(score, worst_recent_severity)
    };
    let overall_status = match status_label {
        "non-compliant" => OverallStatus::NonCompliant,
        "review-required" => OverallStatus::ReviewRequired,
        _ => OverallStatus::Compliant,
    };

    let reasoning_excerpts = include_reasoning.then(|| {
        in_range
            .iter()
            .filter(|e| e.event_type == EventType::Reasoning)
            .filter_map(|e| match &e.payload {
                kontext_core::EventPayload::Reasoning { reasoning_text, .. } => Some(reasoning_text.clone()),
                _ => None,
            })
            .collect()
    });

    let issued_at = Utc::now();
    let body = CertificateBody {
        agent_id,
        issued_at,
        range_since: range.since,
        range_until: range.until,
        action_count,
        transaction_count,
        anomaly_count,
        verify_result_count,
        compliant_verify_count,
        trust_score: score,
        terminal_digest: &terminal_digest,
        chain_valid,
        overall_status,
        reasoning_excerpts: &reasoning_excerpts,
    };
    let content_hash = content_hash(&body)?;

    tracing::info!(agent_id, overall_status = ?overall_status, "compliance certificate issued");

    Ok(ComplianceCertificate {
        agent_id: agent_id.to_string(),
        issued_at,
        range_since: range.since,
        range_until: range.until,
        action_count,
        transaction_count,
        anomaly_count,
        verify_result_count,
        compliant_verify_count,
        trust_score: score,
        terminal_digest,
        chain_valid,
        overall_status,
        reasoning_excerpts,
        content_hash,
    })
}

/// Recompute `content_hash` over every other field and compare against the
/// stored value (spec.md Testable Property 10).
pub fn verify_content_hash(certificate: &ComplianceCertificate) -> Result<bool, AuditError> {
    let body = CertificateBody {
        agent_id: &certificate.agent_id,
        issued_at: certificate.issued_at,
        range_since: certificate.range_since,
        range_until: certificate.range_until,
        action_count: certificate.action_count,
        transaction_count: certificate.transaction_count,
        anomaly_count: certificate.anomaly_count,
        verify_result_count: certificate.verify_result_count,
        compliant_verify_count: certificate.compliant_verify_count,
        trust_score: certificate.trust_score,
        terminal_digest: &certificate.terminal_digest,
        chain_valid: certificate.chain_valid,
        overall_status: certificate.overall_status,
        reasoning_excerpts: &certificate.reasoning_excerpts,
    };
    Ok(content_hash(&body)? == certificate.content_hash)
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
    async fn certificate_content_hash_is_reproducible() {
        let store = EventStore::new(std::sync::Arc::new(MemoryAdapter::new()), StoreLimits::default());
        let mut chain = DigestChain::new();
        store.add_event(chain.append(action_pending("agent-1")).unwrap()).await;

        let certificate = compliance_certificate(
            &store,
            "agent-1",
            CertificateRange::default(),
            false,
            chain.terminal().to_string(),
            &ChainVerification {
                valid: true,
                links_verified: 1,
                first_invalid_index: None,
                elapsed_ms: 0.0,
                terminal: chain.terminal().to_string(),
                reason: None,
            },
        )
        .await
        .unwrap();

        assert!(verify_content_hash(&certificate).unwrap());
    }

    #[tokio::test]
    async fn broken_chain_forces_non_compliant_status() {
        let store = EventStore::new(std::sync::Arc::new(MemoryAdapter::new()), StoreLimits::default());
        let mut chain = DigestChain::new();
        store.add_event(chain.append(action_pending("agent-1")).unwrap()).await;

        let certificate = compliance_certificate(
            &store,
            "agent-1",
            CertificateRange::default(),
            false,
            chain.terminal().to_string(),
            &ChainVerification {
                valid: false,
                links_verified: 0,
                first_invalid_index: Some(0),
                elapsed_ms: 0.0,
                terminal: chain.terminal().to_string(),
                reason: Some("tampered".into()),
            },
        )
        .await
        .unwrap();

        assert_eq!(certificate.overall_status, OverallStatus::NonCompliant);
        assert!(!certificate.chain_valid);
    }
}
