use coord_agents::{AgentRegistry, MessageKind, SessionState};
use coord_agents::testing::StubAgent;
use coord_engine::{CoordinationEngine, EngineConfig, ScenarioSpec};
use coord_ledger::{Ledger, LedgerConfig, ValidatorConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn registry_with_abc() -> Arc<AgentRegistry> {
    let registry = Arc::new(AgentRegistry::new());
    registry.register(Arc::new(StubAgent::initiator("SC"))).await;
    registry.register(Arc::new(StubAgent::budget_reviewer("FIN"))).await;
    registry.register(Arc::new(StubAgent::storage_reviewer("FAC"))).await;
    registry
}

fn fast_ledger() -> Arc<Ledger> {
    Arc::new(Ledger::new(LedgerConfig {
        difficulty: 0,
        consensus_delay_bounds: (0.0, 0.0),
        ..Default::default()
    }))
}

fn spec(context: serde_json::Value) -> ScenarioSpec {
    ScenarioSpec {
        initiator: "SC".to_string(),
        participants: vec!["SC".to_string(), "FIN".to_string(), "FAC".to_string()],
        intent: "restock supplies".to_string(),
        context,
    }
}

#[tokio::test]
async fn scenario_a_storage_bounded_agreement() {
    let engine = CoordinationEngine::new(registry_with_abc().await, fast_ledger(), EngineConfig::default());
    let result = engine
        .coordinate(spec(json!({
            "required_quantity": 1000.0,
            "price_per_unit": 2.00,
            "budget_remaining": 2000.0,
            "storage_available": 800.0,
        })))
        .await;

    let session = result.session;
    assert_eq!(session.state, SessionState::Completed);
    assert_eq!(session.rounds.len(), 2);

    let agreement = session.agreement.expect("completed session carries an agreement");
    assert_eq!(agreement.proposed_quantity, 800.0);
    assert_eq!(agreement.proposed_cost, 1600.0);

    let receipt = session.ledger_receipt.expect("completed session carries a ledger receipt");
    assert_eq!(receipt.block_index, 1);
}

/// spec.md §8 P5: the message-kind sequence for constraint collection must
/// alternate `QUERY · CONSTRAINT` per agent, in registration order — never
/// all `QUERY`s followed by all `CONSTRAINT`s, even though the underlying
/// `propose_constraint` calls race concurrently.
#[tokio::test]
async fn constraint_collection_interleaves_query_and_constraint_messages() {
    let engine = CoordinationEngine::new(registry_with_abc().await, fast_ledger(), EngineConfig::default());
    let result = engine
        .coordinate(spec(json!({
            "required_quantity": 1000.0,
            "price_per_unit": 2.00,
            "budget_remaining": 2000.0,
            "storage_available": 800.0,
        })))
        .await;

    let kinds: Vec<MessageKind> = result.session.messages.iter().map(|m| m.kind).collect();
    let query_and_constraint_kinds: Vec<MessageKind> = kinds
        .iter()
        .copied()
        .filter(|k| matches!(k, MessageKind::Query | MessageKind::Constraint))
        .collect();

    assert_eq!(query_and_constraint_kinds.len(), 4, "one QUERY/CONSTRAINT pair per non-initiator");
    assert_eq!(
        query_and_constraint_kinds,
        vec![
            MessageKind::Query,
            MessageKind::Constraint,
            MessageKind::Query,
            MessageKind::Constraint,
        ]
    );
}

#[tokio::test]
async fn scenario_b_budget_bounded_agreement() {
    let engine = CoordinationEngine::new(registry_with_abc().await, fast_ledger(), EngineConfig::default());
    let result = engine
        .coordinate(spec(json!({
            "required_quantity": 1000.0,
            "price_per_unit": 2.00,
            "budget_remaining": 1200.0,
            "storage_available": 1000.0,
        })))
        .await;

    let session = result.session;
    assert_eq!(session.state, SessionState::Completed);
    assert!(session.rounds.len() <= 2);

    let agreement = session.agreement.unwrap();
    assert_eq!(agreement.proposed_quantity, 600.0);
    assert_eq!(agreement.proposed_cost, 1200.0);
}

#[tokio::test]
async fn scenario_c_simultaneous_tight_constraints() {
    let engine = CoordinationEngine::new(registry_with_abc().await, fast_ledger(), EngineConfig::default());
    let result = engine
        .coordinate(spec(json!({
            "required_quantity": 2000.0,
            "price_per_unit": 2.00,
            "budget_remaining": 1500.0,
            "storage_available": 700.0,
        })))
        .await;

    let session = result.session;
    assert_eq!(session.state, SessionState::Completed);
    let agreement = session.agreement.unwrap();
    assert_eq!(agreement.proposed_quantity, 700.0);
    assert_eq!(agreement.proposed_cost, 1400.0);
}

#[tokio::test]
async fn scenario_d_no_agreement() {
    let registry = Arc::new(AgentRegistry::new());
    registry.register(Arc::new(StubAgent::initiator("SC"))).await;
    registry.register(Arc::new(StubAgent::budget_reviewer("FIN"))).await;
    registry.register(Arc::new(StubAgent::never_satisfied("FAC"))).await;

    let ledger = fast_ledger();
    let engine = CoordinationEngine::new(registry, Arc::clone(&ledger), EngineConfig::default());
    let result = engine
        .coordinate(spec(json!({
            "required_quantity": 1000.0,
            "price_per_unit": 2.00,
            "budget_remaining": 2000.0,
            "storage_available": 800.0,
        })))
        .await;

    let session = result.session;
    assert_eq!(session.state, SessionState::Failed);
    assert_eq!(session.failure_reason.as_deref(), Some("NO_AGREEMENT"));
    assert_eq!(session.rounds.len(), EngineConfig::default().max_rounds as usize);
    assert_eq!(ledger.stats().await.total_blocks, 1);
}

#[tokio::test]
async fn scenario_e_policy_violation_at_validation() {
    let registry = registry_with_abc().await;
    let ledger = Arc::new(Ledger::new(LedgerConfig {
        difficulty: 0,
        consensus_delay_bounds: (0.0, 0.0),
        validator: ValidatorConfig {
            max_single_purchase: 50_000.0,
            ..Default::default()
        },
        ..Default::default()
    }));
    let engine = CoordinationEngine::new(registry, Arc::clone(&ledger), EngineConfig::default());

    let result = engine
        .coordinate(spec(json!({
            "required_quantity": 1000.0,
            "price_per_unit": 75.0,
            "budget_remaining": 1_000_000.0,
            "storage_available": 1_000_000.0,
        })))
        .await;

    let session = result.session;
    assert_eq!(session.state, SessionState::Failed);
    assert_eq!(session.failure_reason.as_deref(), Some("BUDGET_OVER_LIMIT"));
    assert!(session.ledger_receipt.is_none());
    assert_eq!(ledger.stats().await.total_blocks, 1);
}

/// spec.md §4.5 step 3 bounds a non-initiator's `propose_constraint` to
/// `timeout/2` and treats a miss as "no constraint" rather than fatal, so a
/// slow non-initiator alone cannot blow the session deadline. This
/// instruments the initiator's `generate_proposal` instead — a call with no
/// sub-budget carve-out, bounded by the full remaining session time — to
/// exercise genuine deadline-exceeded behavior.
#[tokio::test]
async fn scenario_f_deadline_exceeded() {
    let registry = Arc::new(AgentRegistry::new());
    registry.register(Arc::new(
        StubAgent::initiator("SC").with_call_delay(Duration::from_millis(500)),
    )).await;
    registry.register(Arc::new(StubAgent::budget_reviewer("FIN"))).await;
    registry.register(Arc::new(StubAgent::storage_reviewer("FAC"))).await;

    let ledger = fast_ledger();
    let engine = CoordinationEngine::new(
        registry,
        Arc::clone(&ledger),
        EngineConfig {
            timeout: Duration::from_millis(50),
            ..Default::default()
        },
    );

    let result = engine
        .coordinate(spec(json!({
            "required_quantity": 1000.0,
            "price_per_unit": 2.00,
            "budget_remaining": 2000.0,
            "storage_available": 800.0,
        })))
        .await;

    let session = result.session;
    assert_eq!(session.state, SessionState::Timeout);
    assert_eq!(session.failure_reason.as_deref(), Some("DEADLINE_EXCEEDED"));
    assert!(!session.messages.is_empty());
    assert_eq!(ledger.stats().await.total_blocks, 1);
}

#[tokio::test]
async fn scenario_g_ledger_tamper_detection() {
    let ledger = fast_ledger();
    let engine = CoordinationEngine::new(registry_with_abc().await, Arc::clone(&ledger), EngineConfig::default());

    let result = engine
        .coordinate(spec(json!({
            "required_quantity": 1000.0,
            "price_per_unit": 2.00,
            "budget_remaining": 2000.0,
            "storage_available": 800.0,
        })))
        .await;
    assert_eq!(result.session.state, SessionState::Completed);
    assert!(ledger.validate().await.valid);

    ledger.debug_tamper_block(1).await.unwrap();

    let report = ledger.validate().await;
    assert!(!report.valid);
    assert!(report.errors.iter().any(|e| e.contains("block 1")));
}
