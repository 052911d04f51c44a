use crate::agent::{CritiqueDecision, Proposal, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Intent,
    Query,
    Constraint,
    Inform,
    Proposal,
    Critique,
    Accept,
    Reject,
}

/// Either an explicit set of recipient ids, or the wildcard "every
/// registered participant except the sender".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recipients {
    Ids(Vec<String>),
    AllExcept(String),
}

/// Payload shape, keyed to `kind` — spec.md §6.2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageContent {
    Intent { intent: String, context: Value },
    Query { query: String, about: String },
    Constraint { r#type: String, constraints: Map<String, Value> },
    Inform {
        announcement: String,
        status: Option<String>,
        agreement: Option<Proposal>,
    },
    Proposal(Proposal),
    Decision {
        agent: String,
        decision: Verdict,
        reasoning: String,
        confidence: f64,
        suggested_adjustments: Option<Value>,
    },
}

impl From<&CritiqueDecision> for MessageContent {
    fn from(decision: &CritiqueDecision) -> Self {
        MessageContent::Decision {
            agent: decision.agent.clone(),
            decision: decision.verdict,
            reasoning: decision.reasoning.clone(),
            confidence: decision.confidence,
            suggested_adjustments: decision.suggested_adjustments.clone(),
        }
    }
}

/// One append-only entry in a session's message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub recipients: Recipients,
    pub kind: MessageKind,
    pub content: MessageContent,
}

impl Message {
    pub fn new(
        session_id: impl Into<String>,
        sender: impl Into<String>,
        recipients: Recipients,
        kind: MessageKind,
        content: MessageContent,
    ) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            timestamp: Utc::now(),
            sender: sender.into(),
            recipients,
            kind,
            content,
        }
    }
}
