use crate::validation::ValidationReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;

/// Lifecycle state of a transaction as it moves through submission and
/// commit. A transaction never moves backwards; `Rejected` is terminal and
/// the transaction never appears in any block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Validated,
    Rejected,
}

/// A caller-originated or coordination-originated write to the ledger.
///
/// `details` is an opaque key/value bag. The smart-contract validator only
/// recognizes a handful of well-known keys (`amount`, `quantity`,
/// `confidence`, `available_budget`, `available_storage`); everything else
/// passes through untouched for downstream observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub agent_name: String,
    pub action_type: String,
    pub details: Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub validation_status: TransactionStatus,
    pub validation_report: Option<ValidationReport>,
}

impl Transaction {
    pub fn new(
        transaction_id: impl Into<String>,
        agent_name: impl Into<String>,
        action_type: impl Into<String>,
        details: Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            agent_name: agent_name.into(),
            action_type: action_type.into(),
            details,
            timestamp: Utc::now(),
            validation_status: TransactionStatus::Pending,
            validation_report: None,
        }
    }

    pub fn detail_f64(&self, key: &str) -> Option<f64> {
        self.details.get(key).and_then(|v| v.as_f64())
    }
}
