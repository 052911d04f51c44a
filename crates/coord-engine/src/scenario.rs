use coord_agents::CoordinationSession;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-supplied description of the negotiation to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub initiator: String,
    pub participants: Vec<String>,
    pub intent: String,
    pub context: Value,
}

/// The outcome of a synchronous `coordinate` call. Always carries a
/// session, whatever the final state — a failed or timed-out coordination
/// is a result, not an exception (spec.md §7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationResult {
    pub session: CoordinationSession,
}
