//! The façade (spec.md §2): one `DigestChain`, one `EventStore`, one
//! `ProvenanceManager`, one `ComplianceVerifier`, one `AnomalyEngine`, one
//! `ApprovalEngine`, and one `SanctionsIndex`, wired behind a single entry
//! point the way `vex-core::Client` wires its own constituent stores.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use kontext_audit::{
    compliance_certificate, export as audit_export, AuditExport, CertificateRange,
    ComplianceCertificate, ExportFilters, ExportFormat,
};
use kontext_compliance::{
    trust_score, ComplianceVerifier, SanctionsEntry, SanctionsIndex, VerifierConfig, VerifyInput,
    VerifyVerdict,
};
use kontext_core::{ChainVerification, Event, EventPayload, EventType, Severity};
use kontext_provenance::{
    AttestationInput, ConstraintCheck, CreateSessionInput, ProvenanceBundle, ProvenanceManager,
};
use kontext_rules::{AnomalyEngine, ApprovalEngine, ApprovalRequest, EvaluateInput};
use kontext_store::{EventStore, StorageAdapter, StoreError};

use crate::config::KontextConfig;
use crate::error::EngineError;
use crate::exporter::{EventExporter, ExportQueue};
use crate::logger::{LogInput, Logger};

/// Input to [`Kontext::log_transaction`] — a candidate on-ledger transfer.
#[derive(Debug, Clone)]
pub struct TransactionInput {
    pub project_id: String,
    pub agent_id: String,
    pub session_id: Option<Uuid>,
    pub tx_hash: String,
    pub chain: String,
    pub token: String,
    pub amount: Decimal,
    pub from: String,
    pub to: String,
    pub metadata: serde_json::Value,
}

/// Combined result of logging and evaluating a transaction: the chained
/// transaction event, the compliance verdict recorded alongside it, any
/// anomalies the rule bank fired, and an approval request if any enabled
/// policy triggered.
#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub event: Event,
    pub verdict: VerifyVerdict,
    pub anomalies: Vec<Event>,
    pub approval: Option<ApprovalRequest>,
}

/// Wires every engine together behind one handle. Generic over the storage
/// backend the way every constituent crate's `EventStore<A>` is.
pub struct Kontext<A: StorageAdapter + ?Sized> {
    logger: Arc<Logger<A>>,
    store: Arc<EventStore<A>>,
    provenance: Arc<ProvenanceManager<A>>,
    verifier: Arc<ComplianceVerifier<A>>,
    anomalies: Arc<AnomalyEngine<A>>,
    approvals: Arc<ApprovalEngine>,
    sanctions: Arc<SanctionsIndex>,
}

impl<A: StorageAdapter + ?Sized> Kontext<A> {
    /// Build a fresh façade from a backend and layered configuration. No
    /// exporter and an empty sanctions list — use [`Kontext::with_exporter`]
    /// and [`Kontext::reload_sanctions`] to wire those in afterwards.
    pub fn new(backend: Arc<A>, config: &KontextConfig) -> Self {
        Self::build(backend, config, None, Vec::new())
    }

    pub fn with_exporter(
        backend: Arc<A>,
        config: &KontextConfig,
        exporter: Arc<dyn EventExporter>,
        export_queue_capacity: usize,
    ) -> Self {
        let queue = ExportQueue::spawn(exporter, export_queue_capacity);
        Self::build(backend, config, Some(queue), Vec::new())
    }

    fn build(
        backend: Arc<A>,
        config: &KontextConfig,
        export_queue: Option<ExportQueue>,
        sanctions_entries: Vec<SanctionsEntry>,
    ) -> Self {
        let store = Arc::new(EventStore::new(backend, config.store_limits()));
        let logger = Arc::new(Logger::new(store.clone(), export_queue));
        let provenance = Arc::new(ProvenanceManager::new(store.clone()));
        let sanctions = Arc::new(SanctionsIndex::from_entries(sanctions_entries));
        let verifier = Arc::new(ComplianceVerifier::new(
            sanctions.clone(),
            provenance.clone(),
            store.clone(),
            config.verifier_config(),
        ));
        let anomalies = Arc::new(AnomalyEngine::new(store.clone(), config.anomaly_config()));
        let (policies, ttl) = config.approval_policies();
        let approvals = Arc::new(ApprovalEngine::new(policies, ttl));

        Self { logger, store, provenance, verifier, anomalies, approvals, sanctions }
    }

    // -- Logging -----------------------------------------------------------

    pub async fn log_action(
        &self,
        project_id: &str,
        agent_id: &str,
        session_id: Option<Uuid>,
        action_type: &str,
        metadata: serde_json::Value,
    ) -> Result<Event, EngineError> {
        let event = self
            .logger
            .log_input(LogInput {
                project_id: project_id.to_string(),
                agent_id: agent_id.to_string(),
                session_id,
                correlation_id: None,
                event_type: EventType::Action,
                description: format!("action {action_type}"),
                payload: EventPayload::Action { action_type: action_type.to_string(), metadata },
            })
            .await?;
        Ok(event)
    }

    pub async fn log_reasoning(
        &self,
        project_id: &str,
        agent_id: &str,
        session_id: Option<Uuid>,
        reasoning_text: &str,
        confidence: f64,
        context: serde_json::Value,
    ) -> Result<Event, EngineError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(EngineError::Validation(format!(
                "confidence must be within [0, 1], got {confidence}"
            )));
        }
        let event = self
            .logger
            .log_input(LogInput {
                project_id: project_id.to_string(),
                agent_id: agent_id.to_string(),
                session_id,
                correlation_id: None,
                event_type: EventType::Reasoning,
                description: "reasoning step".into(),
                payload: EventPayload::Reasoning { step: None, reasoning_text: reasoning_text.to_string(), confidence, context },
            })
            .await?;
        Ok(event)
    }

    /// Logs a transaction, verifies compliance, runs the anomaly rule bank
    /// against the agent's prior transactions, and evaluates the approval
    /// policies — the full pipeline spec.md §2's data-flow diagram shows
    /// for an on-ledger transfer.
    pub async fn log_transaction(&self, input: TransactionInput) -> Result<TransactionOutcome, EngineError> {
        let verify_input = VerifyInput {
            agent_id: input.agent_id.clone(),
            session_id: input.session_id,
            chain: input.chain.clone(),
            token: input.token.clone(),
            amount: input.amount,
            from: input.from.clone(),
            to: input.to.clone(),
        };
        // Computed before anything about this candidate is chained, so the
        // anomaly rule bank's own fresh store query never sees itself.
        let is_new_destination = !self
            .store
            .events_by_agent(&input.agent_id)
            .await
            .into_iter()
            .any(|e| matches!(&e.payload, EventPayload::Transaction { to, .. } if to == &input.to));

        let anomalies = self
            .anomalies
            .evaluate_transaction(
                &input.project_id,
                &input.agent_id,
                input.session_id,
                &input.to,
                input.amount,
                self.logger.as_ref(),
            )
            .await?;

        // The verifier is invoked before the transaction is logged (spec.md
        // §2 data flow); its "recent anomaly context" check reads whatever
        // anomaly events the rule bank above just chained.
        let verdict = self.verifier.verify(&verify_input).await;

        let verify_event = self
            .logger
            .log_input(LogInput {
                project_id: input.project_id.clone(),
                agent_id: input.agent_id.clone(),
                session_id: input.session_id,
                correlation_id: None,
                event_type: EventType::VerifyResult,
                description: "compliance verification".into(),
                payload: EventPayload::VerifyResult {
                    compliant: verdict.compliant,
                    risk_level: verdict.risk_level,
                    checks: verdict.checks.clone(),
                },
            })
            .await?;
        tracing::debug!(event_id = %verify_event.id, compliant = verdict.compliant, "compliance verdict recorded");

        // Emitted immediately after verify-result (spec.md §4.6, scenario E5).
        let event = self
            .logger
            .log_input(LogInput {
                project_id: input.project_id.clone(),
                agent_id: input.agent_id.clone(),
                session_id: input.session_id,
                correlation_id: None,
                event_type: EventType::Transaction,
                description: format!("transaction {}", input.tx_hash),
                payload: EventPayload::Transaction {
                    tx_hash: input.tx_hash.clone(),
                    chain: input.chain.clone(),
                    token: input.token.clone(),
                    amount: input.amount,
                    from: input.from.clone(),
                    to: input.to.clone(),
                    metadata: input.metadata.clone(),
                },
            })
            .await?;

        let trust = trust_score(&self.store, &input.agent_id).await;
        let anomaly_severities: Vec<Severity> = anomalies
            .iter()
            .map(|e| match &e.payload {
                EventPayload::Anomaly { severity, .. } => *severity,
                _ => Severity::Low,
            })
            .collect();

        let approval = self
            .approvals
            .evaluate(&EvaluateInput {
                agent_id: input.agent_id.clone(),
                amount: input.amount,
                trust_score: trust,
                anomaly_severities,
                is_new_destination,
            })
            .await;

        Ok(TransactionOutcome { event, verdict, anomalies, approval })
    }

    // -- Provenance ----------------------------------------------------------

    pub async fn create_session(&self, input: CreateSessionInput) -> Result<kontext_core::Session, EngineError> {
        Ok(self.provenance.create_session(input, self.logger.as_ref()).await?)
    }

    pub async fn end_session(&self, session_id: Uuid, project_id: &str) -> Result<kontext_core::Session, EngineError> {
        Ok(self.provenance.end_session(session_id, project_id, self.logger.as_ref()).await?)
    }

    pub async fn validate_scope(&self, session_id: Uuid, capability: &str) -> bool {
        self.provenance.validate_scope(session_id, capability).await
    }

    pub async fn validate_constraints(&self, session_id: Uuid, check: &ConstraintCheck) -> bool {
        self.provenance.validate_constraints(session_id, check).await
    }

    pub async fn create_checkpoint(
        &self,
        session_id: Uuid,
        action_ids: Vec<Uuid>,
        summary: String,
        expires_in: Option<Duration>,
        project_id: &str,
    ) -> Result<kontext_core::Checkpoint, EngineError> {
        Ok(self
            .provenance
            .create_checkpoint(session_id, action_ids, summary, expires_in, project_id, self.logger.as_ref())
            .await?)
    }

    pub async fn attach_attestation(
        &self,
        input: AttestationInput,
        project_id: &str,
    ) -> Result<kontext_core::Checkpoint, EngineError> {
        Ok(self.provenance.attach_attestation(input, project_id, self.logger.as_ref()).await?)
    }

    pub async fn provenance_bundle(&self, session_id: Uuid) -> Result<ProvenanceBundle, EngineError> {
        let outcome = self.verify_chain().await;
        Ok(self
            .provenance
            .provenance_bundle(session_id, outcome.valid)
            .await?)
    }

    // -- Compliance ------------------------------------------------------

    /// Alias for `verify` with no side effects beyond the read-only checks
    /// themselves — named separately so the CLI's `check` subcommand (which
    /// must not write an audit event) and `verify_transaction`'s full
    /// pipeline (which does) stay distinct call sites (spec.md §6).
    pub async fn compliance_check(&self, input: &VerifyInput) -> VerifyVerdict {
        self.verifier.verify(input).await
    }

    pub async fn trust_score(&self, agent_id: &str) -> u8 {
        trust_score(&self.store, agent_id).await
    }

    pub fn reload_sanctions(&self, entries: Vec<SanctionsEntry>) {
        self.sanctions.reload(entries);
    }

    pub fn sanctions_reason(&self, address: &str) -> Option<kontext_compliance::SanctionsReason> {
        self.sanctions.reason(address)
    }

    // -- Rules -------------------------------------------------------------

    pub fn subscribe_anomalies(&self, capacity: usize) -> tokio::sync::mpsc::Receiver<Event> {
        self.anomalies.subscribe(capacity)
    }

    pub async fn submit_approval_decision(
        &self,
        request_id: Uuid,
        decision: kontext_rules::ApprovalDecision,
        evidence: Option<serde_json::Value>,
        reason: Option<String>,
    ) -> Result<ApprovalRequest, EngineError> {
        Ok(self.approvals.submit_decision(request_id, decision, evidence, reason).await?)
    }

    pub async fn get_approval(&self, request_id: Uuid) -> Option<ApprovalRequest> {
        self.approvals.get(request_id).await
    }

    // -- Audit & certification ----------------------------------------------

    pub async fn verify_chain(&self) -> ChainVerification {
        self.logger.verify().await
    }

    pub async fn export(&self, format: ExportFormat, filters: ExportFilters) -> Result<AuditExport, EngineError> {
        let chain_export = self.logger.export_chain().await;
        Ok(audit_export(&self.store, &chain_export, format, &filters).await?)
    }

    pub async fn compliance_certificate(
        &self,
        agent_id: &str,
        range: CertificateRange,
        include_reasoning: bool,
    ) -> Result<ComplianceCertificate, EngineError> {
        let outcome = self.verify_chain().await;
        let terminal_digest = self.logger.terminal_digest().await;
        Ok(compliance_certificate(&self.store, agent_id, range, include_reasoning, terminal_digest, &outcome).await?)
    }

    // -- Persistence ---------------------------------------------------------

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.store.flush().await
    }

    /// Restores the store from the backend, then rebuilds the in-memory
    /// chain from the restored events (spec.md §9, Open Question 2: the
    /// terminal digest is never trusted from the backend, it is always
    /// recomputed by walking the restored links).
    pub async fn restore(&self) -> Result<(), EngineError> {
        self.store.restore().await?;
        let events = self.store.all_events().await;
        let chain = kontext_core::DigestChain::rebuild_from_events(&events)?;
        self.logger.replace_chain(chain).await;
        Ok(())
    }

    pub fn store(&self) -> &Arc<EventStore<A>> {
        &self.store
    }

    pub fn now() -> chrono::DateTime<Utc> {
        Utc::now()
    }
}
