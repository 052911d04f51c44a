use coord_agents::{CoordinationSession, Proposal};
use coord_ledger::Transaction;
use serde_json::{json, Map};

/// Translate an accepted proposal and its scenario context into a ledger
/// transaction. This is the only place the coordination engine talks to
/// the ledger's data model directly.
pub fn build_transaction(session: &CoordinationSession, proposal: &Proposal) -> Transaction {
    let mut details = Map::new();
    details.insert("item_name".to_string(), json!(proposal.item_name));
    details.insert("proposed_quantity".to_string(), json!(proposal.proposed_quantity));
    details.insert("proposed_cost".to_string(), json!(proposal.proposed_cost));
    details.insert("amount".to_string(), json!(proposal.proposed_cost));
    details.insert("quantity".to_string(), json!(proposal.proposed_quantity));
    details.insert("confidence".to_string(), json!(proposal.confidence));
    details.insert(
        "available_budget".to_string(),
        json!(session.context.get("budget_remaining").cloned().unwrap_or(json!(null))),
    );
    details.insert(
        "available_storage".to_string(),
        json!(session.context.get("storage_available").cloned().unwrap_or(json!(null))),
    );
    details.insert("participants".to_string(), json!(session.participants));

    Transaction::new(
        format!("tx-{}", session.session_id),
        session.initiator.clone(),
        "COORDINATED_PURCHASE",
        details,
    )
}
