use crate::agent::{ConstraintRecord, CritiqueDecision, Proposal, ReasoningAgent, Verdict};
use crate::error::AgentError;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// What a [`StubAgent`] does when asked to reason. This is the
/// "deterministic stub satisfying the capability" called for as a test
/// double: no LLM, no network, just table-driven arithmetic over the
/// scenario context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubKind {
    /// Proposes `required_quantity @ price_per_unit`, then refines toward
    /// the tightest suggested quantity from the prior round's critiques.
    Initiator,
    /// Declares `max_amount = context.budget_remaining`; critiques any
    /// proposal whose cost exceeds it.
    BudgetReviewer,
    /// Declares `max_quantity = context.storage_available`; critiques any
    /// proposal whose quantity exceeds it.
    StorageReviewer,
    /// Accepts everything, declares no limits. Useful as a filler
    /// participant or in registry-only tests.
    Passthrough,
    /// Always critiques, regardless of the proposal — used to exercise the
    /// no-agreement path.
    NeverSatisfied,
}

/// Deterministic [`ReasoningAgent`] used by every end-to-end scenario test
/// and by the CLI demo.
pub struct StubAgent {
    id: String,
    role: String,
    kind: StubKind,
    call_delay: Option<Duration>,
}

impl StubAgent {
    pub fn new(id: impl Into<String>, role: impl Into<String>, kind: StubKind) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            kind,
            call_delay: None,
        }
    }

    pub fn initiator(id: impl Into<String>) -> Self {
        Self::new(id, "initiator", StubKind::Initiator)
    }

    pub fn budget_reviewer(id: impl Into<String>) -> Self {
        Self::new(id, "finance", StubKind::BudgetReviewer)
    }

    pub fn storage_reviewer(id: impl Into<String>) -> Self {
        Self::new(id, "facilities", StubKind::StorageReviewer)
    }

    pub fn passthrough(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self::new(id, role, StubKind::Passthrough)
    }

    pub fn never_satisfied(id: impl Into<String>) -> Self {
        Self::new(id, "facilities", StubKind::NeverSatisfied)
    }

    /// Make every capability call on this agent (`propose_constraint`,
    /// `generate_proposal`, `critique`) sleep before returning, for
    /// exercising the engine's deadline handling.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }
}

fn ctx_f64(context: &Value, key: &str) -> Option<f64> {
    context.get(key).and_then(Value::as_f64)
}

#[async_trait]
impl ReasoningAgent for StubAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn role(&self) -> &str {
        &self.role
    }

    async fn propose_constraint(&self, context: &Value) -> Result<ConstraintRecord, AgentError> {
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }

        let mut limits = Map::new();
        match self.kind {
            StubKind::BudgetReviewer => {
                if let Some(budget) = ctx_f64(context, "budget_remaining") {
                    limits.insert("max_amount".to_string(), json!(budget));
                }
            }
            StubKind::StorageReviewer => {
                if let Some(storage) = ctx_f64(context, "storage_available") {
                    limits.insert("max_quantity".to_string(), json!(storage));
                }
            }
            StubKind::Initiator | StubKind::Passthrough | StubKind::NeverSatisfied => {}
        }
        Ok(ConstraintRecord::new(limits))
    }

    async fn generate_proposal(
        &self,
        context: &Value,
        _constraints: &IndexMap<String, ConstraintRecord>,
    ) -> Result<Proposal, AgentError> {
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }

        let required_quantity = ctx_f64(context, "required_quantity").unwrap_or(0.0);
        let price_per_unit = ctx_f64(context, "price_per_unit").unwrap_or(0.0);
        let item_name = context
            .get("item")
            .and_then(Value::as_str)
            .unwrap_or("supplies")
            .to_string();

        let quantity = match context.get("negotiation") {
            Some(negotiation) => {
                let mut candidate = negotiation
                    .get("previous_proposal")
                    .and_then(|p| p.get("proposed_quantity"))
                    .and_then(Value::as_f64)
                    .unwrap_or(required_quantity);

                if let Some(critiques) = negotiation.get("critiques").and_then(Value::as_array) {
                    for critique in critiques {
                        if let Some(suggested) = critique
                            .get("suggested_adjustments")
                            .and_then(|a| a.get("proposed_quantity"))
                            .and_then(Value::as_f64)
                        {
                            candidate = candidate.min(suggested);
                        }
                    }
                }
                candidate
            }
            None => required_quantity,
        };

        let proposed_cost = quantity * price_per_unit;

        Ok(Proposal {
            item_name,
            proposed_quantity: quantity,
            proposed_cost,
            price_per_unit,
            reasoning: format!("proposing {quantity} units at {price_per_unit} per unit"),
            confidence: 0.9,
            constraints_satisfied: quantity <= required_quantity,
        })
    }

    async fn critique(&self, proposal: &Proposal, context: &Value) -> Result<CritiqueDecision, AgentError> {
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }

        let accept = |reasoning: String| CritiqueDecision {
            agent: self.id.clone(),
            verdict: Verdict::Accept,
            reasoning,
            confidence: 0.9,
            suggested_adjustments: None,
        };
        let critique_with_quantity = |reasoning: String, suggested_quantity: f64| CritiqueDecision {
            agent: self.id.clone(),
            verdict: Verdict::Critique,
            reasoning,
            confidence: 0.85,
            suggested_adjustments: Some(json!({ "proposed_quantity": suggested_quantity })),
        };

        match self.kind {
            StubKind::BudgetReviewer => {
                let Some(max_amount) = ctx_f64(context, "budget_remaining") else {
                    return Ok(accept("no budget limit declared".to_string()));
                };
                if proposal.proposed_cost > max_amount {
                    let max_quantity = if proposal.price_per_unit > 0.0 {
                        (max_amount / proposal.price_per_unit).floor()
                    } else {
                        0.0
                    };
                    Ok(critique_with_quantity(
                        format!(
                            "proposed cost {} exceeds available budget {}",
                            proposal.proposed_cost, max_amount
                        ),
                        max_quantity,
                    ))
                } else {
                    Ok(accept("within budget".to_string()))
                }
            }
            StubKind::StorageReviewer => {
                let Some(max_quantity) = ctx_f64(context, "storage_available") else {
                    return Ok(accept("no storage limit declared".to_string()));
                };
                if proposal.proposed_quantity > max_quantity {
                    Ok(critique_with_quantity(
                        format!(
                            "proposed quantity {} exceeds available storage {}",
                            proposal.proposed_quantity, max_quantity
                        ),
                        max_quantity,
                    ))
                } else {
                    Ok(accept("within storage capacity".to_string()))
                }
            }
            StubKind::NeverSatisfied => Ok(CritiqueDecision {
                agent: self.id.clone(),
                verdict: Verdict::Critique,
                reasoning: "never satisfied by design".to_string(),
                confidence: 0.5,
                suggested_adjustments: None,
            }),
            StubKind::Initiator | StubKind::Passthrough => Ok(accept("no objection".to_string())),
        }
    }
}
