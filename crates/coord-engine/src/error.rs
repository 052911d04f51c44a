use coord_ledger::PolicySubReason;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned directly by the in-process API for requests that never
/// reach a session (e.g. looking up a session id that was never issued).
/// Everything that happens *during* a coordination is instead folded into
/// the session's terminal `state` + `failure_reason` — see [`FailureReason`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },
}

/// The structured reason a session landed on `Failed` or `Timeout`,
/// spec.md §7's error taxonomy made concrete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    InvalidScenario { detail: String },
    UnknownAgent { id: String },
    AgentUnavailable { id: String, detail: String },
    NoAgreement { rounds_attempted: u32 },
    PolicyViolation {
        sub_reason: PolicySubReason,
        detail: String,
    },
    LedgerRejected { detail: String },
    DeadlineExceeded,
}

impl FailureReason {
    /// Short stable tag matching spec.md §7's taxonomy names, suitable for
    /// storing in `CoordinationSession::failure_reason`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidScenario { .. } => "INVALID_SCENARIO",
            Self::UnknownAgent { .. } => "UNKNOWN_AGENT",
            Self::AgentUnavailable { .. } => "AGENT_UNAVAILABLE",
            Self::NoAgreement { .. } => "NO_AGREEMENT",
            Self::PolicyViolation { sub_reason, .. } => match sub_reason {
                PolicySubReason::BudgetExceeded => "BUDGET_EXCEEDED",
                PolicySubReason::BudgetOverLimit => "BUDGET_OVER_LIMIT",
                PolicySubReason::StorageExceeded => "STORAGE_EXCEEDED",
                PolicySubReason::ConfidenceTooLow => "CONFIDENCE_TOO_LOW",
            },
            Self::LedgerRejected { .. } => "LEDGER_REJECTED",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }
}
