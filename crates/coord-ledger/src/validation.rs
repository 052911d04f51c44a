use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

/// Structured reason code for a failing policy check, used by callers (the
/// coordination engine) that need to react to *why* a transaction was
/// rejected rather than just parsing `overall_reason` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicySubReason {
    BudgetExceeded,
    BudgetOverLimit,
    StorageExceeded,
    ConfidenceTooLow,
}

/// Outcome of a single predicate (budget, storage, or confidence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub valid: bool,
    pub reason: String,
    pub remaining: Option<f64>,
    pub sub_reason: Option<PolicySubReason>,
}

impl CheckResult {
    fn pass(reason: impl Into<String>, remaining: Option<f64>) -> Self {
        Self {
            valid: true,
            reason: reason.into(),
            remaining,
            sub_reason: None,
        }
    }

    fn fail(reason: impl Into<String>, remaining: Option<f64>, sub_reason: PolicySubReason) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
            remaining,
            sub_reason: Some(sub_reason),
        }
    }
}

/// The full verdict of a smart-contract validation run over one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub overall_reason: String,
    pub budget: CheckResult,
    pub storage: CheckResult,
    pub confidence: CheckResult,
}

impl ValidationReport {
    /// Reasons of every failing sub-check, in the stable budget/storage/confidence order.
    pub fn failing_reasons(&self) -> Vec<&str> {
        [&self.budget, &self.storage, &self.confidence]
            .into_iter()
            .filter(|c| !c.valid)
            .map(|c| c.reason.as_str())
            .collect()
    }

    /// The sub-reason of the first failing check, in budget/storage/confidence order.
    pub fn first_sub_reason(&self) -> Option<PolicySubReason> {
        [&self.budget, &self.storage, &self.confidence]
            .into_iter()
            .find_map(|c| c.sub_reason)
    }
}

/// Policy thresholds the validator is configured with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatorConfig {
    pub max_single_purchase: f64,
    pub min_confidence: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_single_purchase: 50_000.0,
            min_confidence: 0.70,
        }
    }
}

/// Pure predicate gate over a transaction's `details`. Holds no state and
/// performs no I/O: swapping in a different policy is a matter of
/// constructing a different `ValidatorConfig`, or implementing a different
/// validator with the same signature.
#[derive(Debug, Clone, Copy)]
pub struct SmartContractValidator {
    config: ValidatorConfig,
}

impl SmartContractValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, tx: &Transaction) -> ValidationReport {
        let budget = self.check_budget(tx);
        let storage = self.check_storage(tx);
        let confidence = self.check_confidence(tx);

        let valid = budget.valid && storage.valid && confidence.valid;
        let overall_reason = if valid {
            "all checks passed".to_string()
        } else {
            [&budget, &storage, &confidence]
                .into_iter()
                .filter(|c| !c.valid)
                .map(|c| c.reason.clone())
                .collect::<Vec<_>>()
                .join("; ")
        };

        ValidationReport {
            valid,
            overall_reason,
            budget,
            storage,
            confidence,
        }
    }

    fn check_budget(&self, tx: &Transaction) -> CheckResult {
        let Some(amount) = tx.detail_f64("amount") else {
            return CheckResult::pass("amount not present, budget check not applicable", None);
        };

        if amount <= 0.0 {
            return CheckResult::fail(
                format!("amount {amount} is not positive"),
                None,
                PolicySubReason::BudgetExceeded,
            );
        }

        if amount > self.config.max_single_purchase {
            return CheckResult::fail(
                format!(
                    "amount {amount} exceeds autonomous purchase limit {}",
                    self.config.max_single_purchase
                ),
                Some(self.config.max_single_purchase),
                PolicySubReason::BudgetOverLimit,
            );
        }

        if let Some(available) = tx.detail_f64("available_budget") {
            if amount > available {
                return CheckResult::fail(
                    format!("amount {amount} exceeds available budget {available}"),
                    Some(available - amount),
                    PolicySubReason::BudgetExceeded,
                );
            }
            return CheckResult::pass("within available budget", Some(available - amount));
        }

        CheckResult::pass("within autonomous purchase limit", None)
    }

    fn check_storage(&self, tx: &Transaction) -> CheckResult {
        let Some(quantity) = tx.detail_f64("quantity") else {
            return CheckResult::pass("quantity not present, storage check not applicable", None);
        };

        if quantity <= 0.0 {
            return CheckResult::fail(
                format!("quantity {quantity} is not positive"),
                None,
                PolicySubReason::StorageExceeded,
            );
        }

        if let Some(available) = tx.detail_f64("available_storage") {
            if quantity > available {
                return CheckResult::fail(
                    format!("quantity {quantity} exceeds available storage {available}"),
                    Some(available - quantity),
                    PolicySubReason::StorageExceeded,
                );
            }
            return CheckResult::pass("within available storage", Some(available - quantity));
        }

        CheckResult::pass("no storage capacity declared", None)
    }

    fn check_confidence(&self, tx: &Transaction) -> CheckResult {
        let Some(confidence) = tx.detail_f64("confidence") else {
            return CheckResult::pass("confidence not present, check not applicable", None);
        };

        if confidence < self.config.min_confidence {
            return CheckResult::fail(
                format!(
                    "confidence {confidence} below minimum {}",
                    self.config.min_confidence
                ),
                None,
                PolicySubReason::ConfidenceTooLow,
            );
        }

        CheckResult::pass("confidence above minimum", None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx_with(details: serde_json::Value) -> Transaction {
        Transaction::new(
            "tx-1",
            "SC",
            "PURCHASE_ORDER",
            details.as_object().unwrap().clone(),
        )
    }

    #[test]
    fn absent_keys_pass_vacuously() {
        let validator = SmartContractValidator::new(ValidatorConfig::default());
        let report = validator.validate(&tx_with(json!({})));
        assert!(report.valid);
    }

    #[test]
    fn amount_over_autonomous_cap_rejected_even_with_budget_headroom() {
        let validator = SmartContractValidator::new(ValidatorConfig::default());
        let report = validator.validate(&tx_with(json!({
            "amount": 75_000.0,
            "available_budget": 100_000.0,
        })));
        assert!(!report.valid);
        assert_eq!(
            report.first_sub_reason(),
            Some(PolicySubReason::BudgetOverLimit)
        );
    }

    #[test]
    fn quantity_over_available_storage_rejected() {
        let validator = SmartContractValidator::new(ValidatorConfig::default());
        let report = validator.validate(&tx_with(json!({
            "quantity": 900.0,
            "available_storage": 800.0,
        })));
        assert!(!report.valid);
        assert_eq!(
            report.first_sub_reason(),
            Some(PolicySubReason::StorageExceeded)
        );
    }

    #[test]
    fn confidence_below_minimum_rejected() {
        let validator = SmartContractValidator::new(ValidatorConfig::default());
        let report = validator.validate(&tx_with(json!({ "confidence": 0.5 })));
        assert!(!report.valid);
        assert_eq!(
            report.first_sub_reason(),
            Some(PolicySubReason::ConfidenceTooLow)
        );
    }

    #[test]
    fn overall_reason_lists_failures_in_stable_order() {
        let validator = SmartContractValidator::new(ValidatorConfig::default());
        let report = validator.validate(&tx_with(json!({
            "amount": -1.0,
            "quantity": -1.0,
            "confidence": 0.1,
        })));
        assert!(!report.valid);
        let reasons = report.failing_reasons();
        assert_eq!(reasons.len(), 3);
    }
}
