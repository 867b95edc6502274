//! Façade-level integration scenarios E1, E5, E6. E2 lives in
//! `kontext-core`, E3/E4 in `kontext-provenance` — this file covers the
//! scenarios that only make sense once every engine is wired together.

use std::sync::Arc;

use kontext_compliance::{SanctionsEntry, SanctionsReason};
use kontext_engine::{config::KontextConfig, Kontext, TransactionInput};
use kontext_rules::ApprovalDecision;
use kontext_store::MemoryAdapter;
use rust_decimal::Decimal;

fn harness() -> Kontext<MemoryAdapter> {
    Kontext::new(Arc::new(MemoryAdapter::new()), &KontextConfig::default())
}

// E1: empty chain verifies intact with zero links.
#[tokio::test]
async fn e1_empty_chain_verifies_intact() {
    let kontext = harness();
    let outcome = kontext.verify_chain().await;
    assert!(outcome.valid, "expected intact empty chain, got {outcome:?}");
    assert_eq!(outcome.links_verified, 0);
}

// E5: sanctioned counterparty fails verification with risk_level critical,
// and the verify-result event immediately precedes the transaction event.
#[tokio::test]
async fn e5_sanctions_hit_marks_critical_and_orders_verify_before_transaction() {
    let kontext = harness();
    let sanctioned = "0xabcabcabcabcabcabcabcabcabcabcabcabcabc";
    kontext.reload_sanctions(vec![SanctionsEntry {
        address: sanctioned.into(),
        reason: SanctionsReason { entity_name: "blocked corp".into(), lists: vec!["OFAC".into()], source_id: "1".into() },
    }]);

    let outcome = kontext
        .log_transaction(TransactionInput {
            project_id: "proj".into(),
            agent_id: "agent-1".into(),
            session_id: None,
            tx_hash: "0xdeadbeef".into(),
            chain: "base".into(),
            token: "USDC".into(),
            amount: Decimal::from(5),
            from: "0x1111111111111111111111111111111111111111".into(),
            to: "0xABCABCABCABCABCABCABCABCABCABCABCABCABC".into(),
            metadata: serde_json::json!({}),
        })
        .await
        .unwrap();

    assert!(!outcome.verdict.compliant);
    assert_eq!(outcome.verdict.risk_level, kontext_core::Severity::Critical);
    assert!(outcome.verdict.checks.iter().any(|c| c.name == "sanctions" && !c.passed));

    let events = kontext.store().all_events().await;
    let verify_idx = events.iter().position(|e| e.event_type == kontext_core::EventType::VerifyResult).unwrap();
    let tx_idx = events.iter().position(|e| e.event_type == kontext_core::EventType::Transaction).unwrap();
    assert_eq!(tx_idx, verify_idx + 1, "transaction event must immediately follow verify-result");
}

// E6: an approval request with a zero-second TTL is already expired by the
// time a decision is submitted against it.
#[tokio::test]
async fn e6_approval_expires_before_decision_submitted() {
    let mut config = KontextConfig::default();
    config.approval.manual = true;
    config.approval.ttl_seconds = 0;
    let kontext = Kontext::new(Arc::new(MemoryAdapter::new()), &config);

    let outcome = kontext
        .log_transaction(TransactionInput {
            project_id: "proj".into(),
            agent_id: "agent-1".into(),
            session_id: None,
            tx_hash: "0xfeedface".into(),
            chain: "ethereum".into(),
            token: "USDC".into(),
            amount: Decimal::from(1),
            from: "0x1111111111111111111111111111111111111111".into(),
            to: "0x2222222222222222222222222222222222222222".into(),
            metadata: serde_json::json!({}),
        })
        .await
        .unwrap();

    let request = outcome.approval.expect("manual policy always triggers a request");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let err = kontext
        .submit_approval_decision(request.request_id, ApprovalDecision::Approved, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, kontext_engine::EngineError::Rules(kontext_rules::RulesError::ApprovalExpired { .. })));

    let reloaded = kontext.get_approval(request.request_id).await.unwrap();
    assert_eq!(reloaded.status, kontext_rules::ApprovalStatus::Expired);
}
