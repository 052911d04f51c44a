use crate::agent::{ConstraintRecord, CritiqueDecision, Proposal};
use crate::message::Message;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Initiated,
    CollectingConstraints,
    GeneratingProposal,
    Negotiating,
    Validating,
    Executing,
    Completed,
    Failed,
    Timeout,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Timeout)
    }
}

/// `{block_index, block_hash, transaction_id}` handed back to a session
/// after a successful execution step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub block_index: u64,
    pub block_hash: String,
    pub transaction_id: String,
}

/// One proposal-plus-critiques cycle within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationRound {
    pub round_number: u32,
    pub proposal: Proposal,
    pub critiques: Vec<CritiqueDecision>,
    pub duration_ms: u64,
}

/// One execution of the eight-step protocol, from `Initiated` to a terminal
/// state. Owned exclusively by the engine task driving it until terminal;
/// external readers only ever see cloned snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationSession {
    pub session_id: String,
    pub state: SessionState,
    pub initiator: String,
    pub participants: Vec<String>,
    pub intent: String,
    pub context: Value,
    pub constraints: IndexMap<String, ConstraintRecord>,
    pub rounds: Vec<NegotiationRound>,
    pub final_proposal: Option<Proposal>,
    pub agreement: Option<Proposal>,
    pub ledger_receipt: Option<LedgerReceipt>,
    pub messages: Vec<Message>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Human-readable reason attached when `state` lands on `Failed` or
    /// `Timeout` — e.g. `"NO_AGREEMENT"`, `"BUDGET_OVER_LIMIT"`.
    pub failure_reason: Option<String>,
}

impl CoordinationSession {
    pub fn new(
        session_id: impl Into<String>,
        initiator: impl Into<String>,
        participants: Vec<String>,
        intent: impl Into<String>,
        context: Value,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            state: SessionState::Initiated,
            initiator: initiator.into(),
            participants,
            intent: intent.into(),
            context,
            constraints: IndexMap::new(),
            rounds: Vec::new(),
            final_proposal: None,
            agreement: None,
            ledger_receipt: None,
            messages: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            failure_reason: None,
        }
    }

    pub fn non_initiators(&self) -> Vec<String> {
        self.participants
            .iter()
            .filter(|p| *p != &self.initiator)
            .cloned()
            .collect()
    }
}
