use crate::error::AgentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An agent's declared limits for a given scenario (budget cap, storage
/// cap, …). Kept as an opaque map so new agent kinds never require a core
/// change; callers that know a particular agent's vocabulary read it with
/// [`ConstraintRecord::get_f64`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConstraintRecord {
    pub limits: Map<String, Value>,
}

impl ConstraintRecord {
    pub fn new(limits: Map<String, Value>) -> Self {
        Self { limits }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.limits.get(key).and_then(Value::as_f64)
    }
}

/// A proposal produced by the initiator, either fresh or refined in
/// response to critiques from a prior round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub item_name: String,
    pub proposed_quantity: f64,
    pub proposed_cost: f64,
    pub price_per_unit: f64,
    pub reasoning: String,
    pub confidence: f64,
    pub constraints_satisfied: bool,
}

/// A non-initiator's verdict on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Accept,
    Critique,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CritiqueDecision {
    pub agent: String,
    pub verdict: Verdict,
    pub reasoning: String,
    pub confidence: f64,
    pub suggested_adjustments: Option<Value>,
}

/// The single capability the coordination engine depends on. The engine
/// never reasons about what is behind this trait — an LLM-backed agent, a
/// rule-based stub, anything implementing these three calls can take part
/// in a negotiation.
#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    fn id(&self) -> &str;
    fn role(&self) -> &str;

    /// Declare this agent's limits relevant to `context`.
    async fn propose_constraint(&self, context: &Value) -> Result<ConstraintRecord, AgentError>;

    /// Only ever called on the scenario's initiator.
    async fn generate_proposal(
        &self,
        context: &Value,
        constraints: &indexmap::IndexMap<String, ConstraintRecord>,
    ) -> Result<Proposal, AgentError>;

    async fn critique(&self, proposal: &Proposal, context: &Value) -> Result<CritiqueDecision, AgentError>;
}
