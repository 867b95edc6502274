//! Provenance Manager (C5) — the three-layer delegation state machine:
//! session lifecycle, action binding, and checkpoint attestation.
//!
//! `ProvenanceManager` never depends on `kontext-engine`; it is handed an
//! `&dyn EventLogger` (the port defined in `kontext-core`) by whichever
//! caller owns the Logger, so it stays unit-testable in isolation per
//! spec.md §9.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use kontext_core::{
    actions_digest, normalize, AttestationDecision, Attestation as ChainAttestation, Checkpoint,
    CheckpointStatus, Event, EventLogger, EventPayload, EventType, PendingEvent, Session,
    SessionConstraints, SessionDelta, SessionStatus,
};
use kontext_store::{EventStore, StorageAdapter};

use crate::error::ProvenanceError;

/// Input to [`ProvenanceManager::create_session`].
#[derive(Debug, Clone)]
pub struct CreateSessionInput {
    pub project_id: String,
    pub agent_id: String,
    pub correlation_id: Option<String>,
    pub delegated_by: String,
    pub scope: Vec<String>,
    pub constraints: Option<SessionConstraints>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Fields checked by [`ProvenanceManager::validate_constraints`]; only the
/// fields the caller supplies are checked (spec.md §4.5: "all *provided*
/// fields must satisfy").
#[derive(Debug, Clone, Default)]
pub struct ConstraintCheck {
    pub amount: Option<Decimal>,
    pub chain: Option<String>,
    pub token: Option<String>,
    pub to: Option<String>,
}

/// Input to [`ProvenanceManager::attach_attestation`].
#[derive(Debug, Clone)]
pub struct AttestationInput {
    pub checkpoint_id: Uuid,
    pub reviewer_id: String,
    pub decision: AttestationDecision,
    pub signature: Vec<u8>,
}

/// A session's user actions plus checkpoint coverage, exportable as proof of
/// reviewed agent activity (spec.md Glossary: "Provenance bundle").
#[derive(Debug, Clone)]
pub struct ProvenanceBundle {
    pub session: Session,
    pub user_actions: Vec<Event>,
    pub checkpoints: Vec<Checkpoint>,
    pub digest_chain_valid: bool,
    pub total_actions: usize,
    pub human_attested: usize,
    pub unattested: usize,
}

fn normalize_constraints(constraints: Option<SessionConstraints>) -> Option<SessionConstraints> {
    constraints.map(|mut c| {
        if let Some(recipients) = c.allowed_recipients.take() {
            c.allowed_recipients = Some(recipients.iter().map(|a| normalize(a)).collect());
        }
        c
    })
}

fn correlation_id(explicit: Option<String>) -> String {
    explicit.unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub struct ProvenanceManager<A: StorageAdapter + ?Sized> {
    store: Arc<EventStore<A>>,
}

impl<A: StorageAdapter + ?Sized> ProvenanceManager<A> {
    pub fn new(store: Arc<EventStore<A>>) -> Self {
        Self { store }
    }

    pub async fn create_session(
        &self,
        input: CreateSessionInput,
        logger: &dyn EventLogger,
    ) -> Result<Session, ProvenanceError> {
        if input.agent_id.trim().is_empty() {
            return Err(ProvenanceError::Validation("agent_id must not be empty".into()));
        }
        if input.delegated_by.trim().is_empty() {
            return Err(ProvenanceError::Validation("delegated_by must not be empty".into()));
        }
        if input.scope.is_empty() {
            return Err(ProvenanceError::Validation("scope must not be empty".into()));
        }

        let session_id = Uuid::new_v4();
        let constraints = normalize_constraints(input.constraints.clone());

        let pending = PendingEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            project_id: input.project_id.clone(),
            agent_id: input.agent_id.clone(),
            session_id: Some(session_id),
            correlation_id: correlation_id(input.correlation_id.clone()),
            event_type: EventType::SessionStart,
            description: format!("session delegated by {}", input.delegated_by),
            payload: EventPayload::Session(SessionDelta::Start {
                delegated_by: input.delegated_by.clone(),
                scope: input.scope.clone(),
                constraints: constraints.clone(),
            }),
        };
        let event = logger.log(pending).await?;

        let session = Session {
            session_id,
            agent_id: input.agent_id,
            delegated_by: input.delegated_by,
            scope: input.scope,
            constraints,
            status: SessionStatus::Active,
            created_at: event.timestamp,
            expires_at: input.expires_at,
            ended_at: None,
            genesis_digest: event.digest.clone(),
        };
        self.store.upsert_session(session.clone()).await;
        tracing::info!(session_id = %session_id, agent_id = %session.agent_id, "session started");
        Ok(session)
    }

    pub async fn end_session(
        &self,
        session_id: Uuid,
        project_id: &str,
        logger: &dyn EventLogger,
    ) -> Result<Session, ProvenanceError> {
        let mut session = self
            .store
            .get_session(session_id)
            .await
            .ok_or(ProvenanceError::SessionNotFound { session_id })?;

        let now = Utc::now();
        if session.effective_status(now) != SessionStatus::Active {
            return Err(ProvenanceError::SessionNotActive { session_id });
        }

        let pending = PendingEvent {
            id: Uuid::new_v4(),
            timestamp: now,
            project_id: project_id.to_string(),
            agent_id: session.agent_id.clone(),
            session_id: Some(session_id),
            correlation_id: Uuid::new_v4().to_string(),
            event_type: EventType::SessionEnd,
            description: "session ended".into(),
            payload: EventPayload::Session(SessionDelta::End),
        };
        let event = logger.log(pending).await?;

        session.status = SessionStatus::Ended;
        session.ended_at = Some(event.timestamp);
        self.store.upsert_session(session.clone()).await;
        tracing::info!(session_id = %session_id, "session ended");
        Ok(session)
    }

    pub async fn validate_scope(&self, session_id: Uuid, capability: &str) -> bool {
        let now = Utc::now();
        match self.store.get_session(session_id).await {
            Some(session) if session.is_active(now) => session.has_capability(capability),
            _ => false,
        }
    }

    pub async fn validate_constraints(&self, session_id: Uuid, check: &ConstraintCheck) -> bool {
        let now = Utc::now();
        let Some(session) = self.store.get_session(session_id).await else {
            return false;
        };
        if !session.is_active(now) {
            return false;
        }
        let Some(constraints) = &session.constraints else {
            return true;
        };

        if let (Some(amount), Some(max_amount)) = (check.amount, constraints.max_amount.as_deref()) {
            match max_amount.parse::<Decimal>() {
                Ok(max) if amount > max => return false,
                Err(_) => return false,
                _ => {}
            }
        }
        if let (Some(chain), Some(allowed)) = (&check.chain, &constraints.allowed_chains) {
            if !allowed.iter().any(|c| c == chain) {
                return false;
            }
        }
        if let (Some(token), Some(allowed)) = (&check.token, &constraints.allowed_tokens) {
            if !allowed.iter().any(|t| t == token) {
                return false;
            }
        }
        if let (Some(to), Some(allowed)) = (&check.to, &constraints.allowed_recipients) {
            let normalized_to = normalize(to);
            if !allowed.iter().any(|r| r == &normalized_to) {
                return false;
            }
        }
        true
    }

    pub async fn create_checkpoint(
        &self,
        session_id: Uuid,
        action_ids: Vec<Uuid>,
        summary: String,
        expires_in: Option<Duration>,
        project_id: &str,
        logger: &dyn EventLogger,
    ) -> Result<Checkpoint, ProvenanceError> {
        let session = self
            .store
            .get_session(session_id)
            .await
            .ok_or(ProvenanceError::SessionNotFound { session_id })?;
        let now = Utc::now();
        if session.effective_status(now) != SessionStatus::Active {
            return Err(ProvenanceError::SessionNotActive { session_id });
        }

        let mut digests = Vec::with_capacity(action_ids.len());
        for action_id in &action_ids {
            let event = self.store.get_event(*action_id).await.ok_or_else(|| {
                ProvenanceError::Validation(format!("action {action_id} does not exist"))
            })?;
            if event.session_id != Some(session_id) {
                return Err(ProvenanceError::Validation(format!(
                    "action {action_id} does not belong to session {session_id}"
                )));
            }
            digests.push(event.digest);
        }
        let digest = actions_digest(digests);

        let checkpoint_id = Uuid::new_v4();
        let pending = PendingEvent {
            id: Uuid::new_v4(),
            timestamp: now,
            project_id: project_id.to_string(),
            agent_id: session.agent_id.clone(),
            session_id: Some(session_id),
            correlation_id: Uuid::new_v4().to_string(),
            event_type: EventType::CheckpointCreated,
            description: summary.clone(),
            payload: EventPayload::Checkpoint {
                checkpoint_id,
                action_ids: action_ids.clone(),
                summary: summary.clone(),
                actions_digest: digest.clone(),
                reviewer: None,
                decision: None,
            },
        };
        let event = logger.log(pending).await?;

        let checkpoint = Checkpoint {
            checkpoint_id,
            session_id,
            action_ids,
            summary,
            actions_digest: digest,
            status: CheckpointStatus::Pending,
            created_at: event.timestamp,
            expires_at: expires_in.map(|d| event.timestamp + d),
            attestation: None,
        };
        self.store.upsert_checkpoint(checkpoint.clone()).await;
        tracing::info!(checkpoint_id = %checkpoint_id, session_id = %session_id, "checkpoint created");
        Ok(checkpoint)
    }

    pub async fn attach_attestation(
        &self,
        input: AttestationInput,
        project_id: &str,
        logger: &dyn EventLogger,
    ) -> Result<Checkpoint, ProvenanceError> {
        let mut checkpoint = self
            .store
            .get_checkpoint(input.checkpoint_id)
            .await
            .ok_or(ProvenanceError::CheckpointNotFound { checkpoint_id: input.checkpoint_id })?;

        let now = Utc::now();
        match checkpoint.effective_status(now) {
            CheckpointStatus::Pending => {}
            CheckpointStatus::Expired => {
                return Err(ProvenanceError::CheckpointExpired { checkpoint_id: input.checkpoint_id })
            }
            _ => return Err(ProvenanceError::CheckpointNotPending { checkpoint_id: input.checkpoint_id }),
        }

        let event_type = match input.decision {
            AttestationDecision::Approved => EventType::CheckpointAttested,
            AttestationDecision::Rejected => EventType::CheckpointRejected,
        };

        let session = self
            .store
            .get_session(checkpoint.session_id)
            .await
            .ok_or(ProvenanceError::SessionNotFound { session_id: checkpoint.session_id })?;

        let pending = PendingEvent {
            id: Uuid::new_v4(),
            timestamp: now,
            project_id: project_id.to_string(),
            agent_id: session.agent_id,
            session_id: Some(checkpoint.session_id),
            correlation_id: Uuid::new_v4().to_string(),
            event_type,
            description: format!("checkpoint {} attestation", checkpoint.checkpoint_id),
            payload: EventPayload::Checkpoint {
                checkpoint_id: checkpoint.checkpoint_id,
                action_ids: checkpoint.action_ids.clone(),
                summary: checkpoint.summary.clone(),
                actions_digest: checkpoint.actions_digest.clone(),
                reviewer: Some(input.reviewer_id.clone()),
                decision: Some(input.decision),
            },
        };
        let event = logger.log(pending).await?;

        checkpoint.status = match input.decision {
            AttestationDecision::Approved => CheckpointStatus::Attested,
            AttestationDecision::Rejected => CheckpointStatus::Rejected,
        };
        checkpoint.attestation = Some(ChainAttestation {
            reviewer_id: input.reviewer_id,
            decision: input.decision,
            signature: input.signature,
            decided_at: event.timestamp,
        });
        self.store.upsert_checkpoint(checkpoint.clone()).await;
        tracing::info!(checkpoint_id = %checkpoint.checkpoint_id, decision = ?input.decision, "checkpoint attested");
        Ok(checkpoint)
    }

    /// Build the provenance bundle export (spec.md §4.5).
    pub async fn provenance_bundle(
        &self,
        session_id: Uuid,
        digest_chain_valid: bool,
    ) -> Result<ProvenanceBundle, ProvenanceError> {
        let session = self
            .store
            .get_session(session_id)
            .await
            .ok_or(ProvenanceError::SessionNotFound { session_id })?;

        let user_actions: Vec<Event> = self
            .store
            .events_by_session(session_id)
            .await
            .into_iter()
            .filter(Event::is_user_action)
            .collect();
        let checkpoints = self.store.checkpoints_for_session(session_id).await;

        let attested_ids: HashSet<Uuid> = checkpoints
            .iter()
            .filter(|c| c.status == CheckpointStatus::Attested)
            .flat_map(|c| c.action_ids.iter().copied())
            .collect();
        let user_action_ids: HashSet<Uuid> = user_actions.iter().map(|e| e.id).collect();
        let human_attested = attested_ids.intersection(&user_action_ids).count();
        let total_actions = user_actions.len();
        let unattested = total_actions.saturating_sub(human_attested);

        Ok(ProvenanceBundle {
            session,
            user_actions,
            checkpoints,
            digest_chain_valid,
            total_actions,
            human_attested,
            unattested,
        })
    }
}
