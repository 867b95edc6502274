//! Compliance Verifier (C6) — a read-only check run before a transaction is
//! allowed to execute (spec.md §4.6). Bundles the read-only collaborators it
//! needs (sanctions index, provenance manager, event store) but has no
//! direct dependency on `kontext-engine`; the Logger calls it, not the other
//! way around.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use kontext_core::{ComplianceCheck, Severity};
use kontext_provenance::{ConstraintCheck, ProvenanceManager};
use kontext_store::{EventStore, StorageAdapter};

use crate::sanctions::SanctionsIndex;

/// The transaction under review.
#[derive(Debug, Clone)]
pub struct VerifyInput {
    pub agent_id: String,
    pub session_id: Option<Uuid>,
    pub chain: String,
    pub token: String,
    pub amount: Decimal,
    pub from: String,
    pub to: String,
}

/// Tunables that would otherwise be magic constants (spec.md §4.6 leaves the
/// amount threshold and anomaly lookback window as deployment-specific
/// configuration).
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub amount_threshold: Option<Decimal>,
    pub anomaly_window: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            amount_threshold: None,
            anomaly_window: Duration::hours(1),
        }
    }
}

/// The verifier's verdict: `compliant` iff every `High`-or-`Critical` check
/// passed; `risk_level` is the highest severity among the checks that
/// failed, or `Low` if none did.
#[derive(Debug, Clone)]
pub struct VerifyVerdict {
    pub compliant: bool,
    pub risk_level: Severity,
    pub checks: Vec<ComplianceCheck>,
}

pub struct ComplianceVerifier<A: StorageAdapter + ?Sized> {
    sanctions: Arc<SanctionsIndex>,
    provenance: Arc<ProvenanceManager<A>>,
    store: Arc<EventStore<A>>,
    config: VerifierConfig,
}

impl<A: StorageAdapter + ?Sized> ComplianceVerifier<A> {
    pub fn new(
        sanctions: Arc<SanctionsIndex>,
        provenance: Arc<ProvenanceManager<A>>,
        store: Arc<EventStore<A>>,
        config: VerifierConfig,
    ) -> Self {
        Self { sanctions, provenance, store, config }
    }

    /// Run the ordered check sequence: sanctions, amount threshold, session
    /// scope, session constraints, recent anomaly context. Each check that
    /// doesn't apply (no session attached, no threshold configured) still
    /// contributes a passing entry rather than being silently skipped, so
    /// the `checks` vector is a complete record of what was evaluated.
    pub async fn verify(&self, input: &VerifyInput) -> VerifyVerdict {
        let mut checks = Vec::with_capacity(5);

        let from_sanctioned = self.sanctions.is_sanctioned(&input.from, &input.chain);
        let to_sanctioned = self.sanctions.is_sanctioned(&input.to, &input.chain);
        checks.push(ComplianceCheck {
            name: "sanctions".into(),
            passed: !from_sanctioned && !to_sanctioned,
            severity: Severity::Critical,
            description: if from_sanctioned || to_sanctioned {
                "counterparty address appears on a sanctions list".into()
            } else {
                "neither counterparty is sanctioned".into()
            },
        });

        let amount_passed = self
            .config
            .amount_threshold
            .map(|threshold| input.amount <= threshold)
            .unwrap_or(true);
        checks.push(ComplianceCheck {
            name: "amount_threshold".into(),
            passed: amount_passed,
            severity: Severity::High,
            description: match self.config.amount_threshold {
                Some(threshold) if !amount_passed => {
                    format!("amount {} exceeds configured threshold {threshold}", input.amount)
                }
                Some(_) => "amount within configured threshold".into(),
                None => "no amount threshold configured".into(),
            },
        });

        if let Some(session_id) = input.session_id {
            let scope_passed = self.provenance.validate_scope(session_id, "transfer").await;
            checks.push(ComplianceCheck {
                name: "session_scope".into(),
                passed: scope_passed,
                severity: Severity::High,
                description: if scope_passed {
                    "session is active and authorizes transfers".into()
                } else {
                    "session is inactive or lacks transfer scope".into()
                },
            });

            let constraint_check = ConstraintCheck {
                amount: Some(input.amount),
                chain: Some(input.chain.clone()),
                token: Some(input.token.clone()),
                to: Some(input.to.clone()),
            };
            let constraints_passed = self.provenance.validate_constraints(session_id, &constraint_check).await;
            checks.push(ComplianceCheck {
                name: "session_constraints".into(),
                passed: constraints_passed,
                severity: Severity::High,
                description: if constraints_passed {
                    "transaction satisfies every session constraint".into()
                } else {
                    "transaction violates a session constraint".into()
                },
            });
        }

        let since = Utc::now() - self.config.anomaly_window;
        let recent_anomalies = self.store.recent_anomalies_for_agent(&input.agent_id, since).await;
        checks.push(ComplianceCheck {
            name: "recent_anomalies".into(),
            passed: recent_anomalies.is_empty(),
            severity: Severity::Medium,
            description: if recent_anomalies.is_empty() {
                "no anomalies recorded for this agent in the lookback window".into()
            } else {
                format!("{} anomaly event(s) recorded in the lookback window", recent_anomalies.len())
            },
        });

        let compliant = checks
            .iter()
            .filter(|c| matches!(c.severity, Severity::High | Severity::Critical))
            .all(|c| c.passed);
        let risk_level = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.severity)
            .max()
            .unwrap_or(Severity::Low);

        tracing::info!(agent_id = %input.agent_id, compliant, risk_level = ?risk_level, "compliance verification complete");

        VerifyVerdict { compliant, risk_level, checks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kontext_store::backend::MemoryAdapter;
    use kontext_store::StoreLimits;

    fn harness() -> (Arc<SanctionsIndex>, Arc<ProvenanceManager<MemoryAdapter>>, Arc<EventStore<MemoryAdapter>>) {
        let store = Arc::new(EventStore::new(Arc::new(MemoryAdapter::new()), StoreLimits::default()));
        let provenance = Arc::new(ProvenanceManager::new(store.clone()));
        let sanctions = Arc::new(SanctionsIndex::empty());
        (sanctions, provenance, store)
    }

    fn input() -> VerifyInput {
        VerifyInput {
            agent_id: "agent-1".into(),
            session_id: None,
            chain: "base".into(),
            token: "USDC".into(),
            amount: "100".parse().unwrap(),
            from: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into(),
            to: "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".into(),
        }
    }

    #[tokio::test]
    async fn clean_transaction_with_no_session_is_compliant() {
        let (sanctions, provenance, store) = harness();
        let verifier = ComplianceVerifier::new(sanctions, provenance, store, VerifierConfig::default());
        let verdict = verifier.verify(&input()).await;
        assert!(verdict.compliant);
        assert_eq!(verdict.risk_level, Severity::Low);
        assert_eq!(verdict.checks.len(), 3);
    }

    #[tokio::test]
    async fn sanctioned_counterparty_fails_and_dominates_risk() {
        let (sanctions, provenance, store) = harness();
        sanctions.reload(vec![crate::sanctions::SanctionsEntry {
            address: "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".into(),
            reason: crate::sanctions::SanctionsReason {
                entity_name: "Blocked".into(),
                lists: vec!["OFAC SDN".into()],
                source_id: "ofac-1".into(),
            },
        }]);
        let verifier = ComplianceVerifier::new(sanctions, provenance, store, VerifierConfig::default());
        let verdict = verifier.verify(&input()).await;
        assert!(!verdict.compliant);
        assert_eq!(verdict.risk_level, Severity::Critical);
    }

    #[tokio::test]
    async fn amount_over_threshold_fails_high_severity() {
        let (sanctions, provenance, store) = harness();
        let config = VerifierConfig { amount_threshold: Some("50".parse().unwrap()), ..VerifierConfig::default() };
        let verifier = ComplianceVerifier::new(sanctions, provenance, store, config);
        let verdict = verifier.verify(&input()).await;
        assert!(!verdict.compliant);
        assert_eq!(verdict.risk_level, Severity::High);
    }

    #[tokio::test]
    async fn missing_session_still_reports_three_checks() {
        let (sanctions, provenance, store) = harness();
        let verifier = ComplianceVerifier::new(sanctions, provenance, store, VerifierConfig::default());
        let verdict = verifier.verify(&input()).await;
        assert!(verdict.checks.iter().any(|c| c.name == "sanctions"));
        assert!(verdict.checks.iter().any(|c| c.name == "amount_threshold"));
        assert!(verdict.checks.iter().any(|c| c.name == "recent_anomalies"));
        assert!(!verdict.checks.iter().any(|c| c.name == "session_scope"));
    }
}
