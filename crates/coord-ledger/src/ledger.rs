use crate::block::{Block, BlockPayload};
use crate::error::LedgerError;
use crate::transaction::{Transaction, TransactionStatus};
use crate::validation::{CheckResult, SmartContractValidator, ValidationReport, ValidatorConfig};
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Ledger construction and policy configuration.
#[derive(Debug, Clone, Copy)]
pub struct LedgerConfig {
    pub batch_size: usize,
    pub difficulty: u32,
    /// Inclusive bounds, in seconds, of the simulated consensus delay.
    pub consensus_delay_bounds: (f64, f64),
    pub validator: ValidatorConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            difficulty: 2,
            consensus_delay_bounds: (0.10, 0.25),
            validator: ValidatorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LedgerStats {
    pub total_blocks: u64,
    pub total_transactions: u64,
    pub pending: u64,
    pub chain_valid: bool,
}

/// Result of walking the full chain and checking every integrity invariant.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChainReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub block_count: u64,
}

struct LedgerState {
    blocks: Vec<Block>,
    pending: Vec<Transaction>,
    rejected: Vec<Transaction>,
    pending_ids: HashSet<String>,
    committed_ids: HashSet<String>,
}

impl LedgerState {
    fn with_genesis(difficulty: u32) -> Self {
        Self {
            blocks: vec![Block::genesis(difficulty)],
            pending: Vec::new(),
            rejected: Vec::new(),
            pending_ids: HashSet::new(),
            committed_ids: HashSet::new(),
        }
    }
}

/// In-memory, cryptographically chained block store with a pending-transaction
/// pool and a pluggable smart-contract validator gating what gets written.
///
/// Writers (`submit`, `commit`, `commit_auto`, `reset`) are serialized on an
/// internal lock; readers (`validate`, `get_block`, `get_blocks`, `stats`,
/// `find_transaction`) take a read lock on the underlying state and never
/// observe a partially-appended block.
pub struct Ledger {
    state: RwLock<LedgerState>,
    write_lock: Mutex<()>,
    config: LedgerConfig,
    validator: SmartContractValidator,
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Self {
        let validator = SmartContractValidator::new(config.validator);
        Self {
            state: RwLock::new(LedgerState::with_genesis(config.difficulty)),
            write_lock: Mutex::new(()),
            config,
            validator,
        }
    }

    /// Validate `tx` against the smart contract, reject on duplicate id, and
    /// queue it in the pending pool if it passes. Never places a rejected
    /// transaction in a block.
    pub async fn submit(&self, mut tx: Transaction) -> ValidationReport {
        let _write = self.write_lock.lock().await;

        {
            let state = self.state.read().await;
            if state.committed_ids.contains(&tx.transaction_id)
                || state.pending_ids.contains(&tx.transaction_id)
            {
                let report = duplicate_report(&tx.transaction_id);
                tx.validation_status = TransactionStatus::Rejected;
                tx.validation_report = Some(report.clone());
                warn!(transaction_id = %tx.transaction_id, "rejected duplicate transaction");
                let mut state = self.state.write().await;
                state.rejected.push(tx);
                return report;
            }
        }

        let report = self.validator.validate(&tx);
        tx.validation_report = Some(report.clone());

        let mut state = self.state.write().await;
        if report.valid {
            tx.validation_status = TransactionStatus::Validated;
            state.pending_ids.insert(tx.transaction_id.clone());
            state.pending.push(tx);
        } else {
            tx.validation_status = TransactionStatus::Rejected;
            info!(reason = %report.overall_reason, "rejected transaction on submit");
            state.rejected.push(tx);
        }

        report
    }

    /// Run the smart-contract validator against `tx` without touching the
    /// pending pool. Used by callers (the coordination engine's VALIDATE
    /// step) that need a policy verdict before deciding whether to submit
    /// at all.
    pub fn dry_run_validate(&self, tx: &Transaction) -> ValidationReport {
        self.validator.validate(tx)
    }

    /// Drain up to `batch_size` pending transactions into a newly mined
    /// block. Returns `Ok(None)` if the pending pool is empty.
    pub async fn commit(&self) -> Result<Option<Block>, LedgerError> {
        let _write = self.write_lock.lock().await;
        self.commit_batch(self.config.batch_size).await
    }

    /// Force an immediate single-transaction commit, used by the
    /// coordination engine so a freshly executed agreement is visible on
    /// the chain right away instead of waiting for the batch to fill.
    pub async fn commit_auto(&self) -> Result<Option<Block>, LedgerError> {
        let _write = self.write_lock.lock().await;
        self.commit_batch(1).await
    }

    async fn commit_batch(&self, batch_size: usize) -> Result<Option<Block>, LedgerError> {
        let (batch, previous_hash, next_index) = {
            let state = self.state.read().await;
            if state.pending.is_empty() {
                return Ok(None);
            }
            let n = state.pending.len().min(batch_size);
            let batch: Vec<Transaction> = state.pending[..n].to_vec();
            let tip = state
                .blocks
                .last()
                .expect("genesis block is always present");
            (batch, tip.hash.clone(), tip.index + 1)
        };

        self.simulate_consensus_delay().await;

        let block = Block::mine(
            next_index,
            previous_hash,
            BlockPayload::Transactions(batch.clone()),
            self.config.difficulty,
        );

        if block.hash != block.recompute_hash() {
            return Err(LedgerError::CommitInvariantViolated {
                reason: "mined block failed its own hash check".to_string(),
            });
        }

        let mut state = self.state.write().await;
        state.pending.drain(..batch.len());
        for tx in &batch {
            state.pending_ids.remove(&tx.transaction_id);
            state.committed_ids.insert(tx.transaction_id.clone());
        }
        info!(index = block.index, hash = %block.hash, txs = batch.len(), "committed block");
        state.blocks.push(block.clone());

        Ok(Some(block))
    }

    async fn simulate_consensus_delay(&self) {
        let (lo, hi) = self.config.consensus_delay_bounds;
        let delay_secs = if hi > lo {
            rand::thread_rng().gen_range(lo..hi)
        } else {
            lo
        };
        tokio::time::sleep(Duration::from_secs_f64(delay_secs)).await;
    }

    /// Walk every block and check hash correctness, chain linkage, the
    /// difficulty predicate, and genesis invariants.
    pub async fn validate(&self) -> ChainReport {
        let state = self.state.read().await;
        let mut errors = Vec::new();

        match state.blocks.first() {
            Some(genesis) if genesis.index == 0 && genesis.previous_hash.is_empty() => {
                if !matches!(genesis.payload, BlockPayload::Genesis { .. }) {
                    errors.push("genesis block payload tag mutated".to_string());
                }
            }
            Some(_) => errors.push("genesis block invariant violated".to_string()),
            None => errors.push("chain has no genesis block".to_string()),
        }

        for (i, block) in state.blocks.iter().enumerate() {
            if block.hash != block.recompute_hash() {
                errors.push(format!("block {} hash does not match its contents", block.index));
            }
            if !hash_meets_difficulty(&block.hash, self.config.difficulty) {
                errors.push(format!("block {} does not meet difficulty target", block.index));
            }
            if i > 0 {
                let previous = &state.blocks[i - 1];
                if block.previous_hash != previous.hash {
                    errors.push(format!(
                        "block {} previous_hash does not match block {}'s hash",
                        block.index, previous.index
                    ));
                }
            }
        }

        ChainReport {
            valid: errors.is_empty(),
            errors,
            block_count: state.blocks.len() as u64,
        }
    }

    pub async fn get_block(&self, index: u64) -> Result<Block, LedgerError> {
        let state = self.state.read().await;
        state
            .blocks
            .get(index as usize)
            .cloned()
            .ok_or(LedgerError::BlockNotFound { index })
    }

    pub async fn get_blocks(&self, offset: usize, limit: usize) -> Vec<Block> {
        let state = self.state.read().await;
        state.blocks.iter().skip(offset).take(limit).cloned().collect()
    }

    pub async fn find_transaction(&self, id: &str) -> Option<Transaction> {
        let state = self.state.read().await;
        state
            .blocks
            .iter()
            .flat_map(|b| b.transactions())
            .find(|tx| tx.transaction_id == id)
            .cloned()
    }

    pub async fn stats(&self) -> LedgerStats {
        let state = self.state.read().await;
        let total_transactions = state.blocks.iter().map(|b| b.transactions().len()).sum::<usize>() as u64;
        drop(state);
        let chain_valid = self.validate().await.valid;
        let state = self.state.read().await;
        LedgerStats {
            total_blocks: state.blocks.len() as u64,
            total_transactions,
            pending: state.pending.len() as u64,
            chain_valid,
        }
    }

    /// Corrupt the first transaction's `amount` in an already-committed
    /// block, in place, without touching its stored hash. Exists so the
    /// demo CLI and integration tests can exercise `validate()`'s tamper
    /// detection against a real chain instead of reaching into private
    /// state; no legitimate caller outside a demo has a reason to use it.
    pub async fn debug_tamper_block(&self, index: u64) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        let block = state
            .blocks
            .get_mut(index as usize)
            .ok_or(LedgerError::BlockNotFound { index })?;
        if let BlockPayload::Transactions(txs) = &mut block.payload {
            if let Some(tx) = txs.first_mut() {
                tx.details.insert("amount".to_string(), serde_json::json!(999_999.0));
            }
        }
        Ok(())
    }

    /// Wipe all state and re-create the genesis block. Demo-only: callers
    /// must ensure no coordination session is mid-flight when calling this.
    pub async fn reset(&self) {
        let _write = self.write_lock.lock().await;
        let mut state = self.state.write().await;
        *state = LedgerState::with_genesis(self.config.difficulty);
    }
}

fn duplicate_report(id: &str) -> ValidationReport {
    let na = CheckResult {
        valid: true,
        reason: "not evaluated: duplicate transaction id".to_string(),
        remaining: None,
        sub_reason: None,
    };
    ValidationReport {
        valid: false,
        overall_reason: format!("duplicate transaction id: {id}"),
        budget: na.clone(),
        storage: na.clone(),
        confidence: na,
    }
}

fn hash_meets_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash_hex.len() >= difficulty && hash_hex.as_bytes()[..difficulty].iter().all(|&b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tx(id: &str) -> Transaction {
        Transaction::new(
            id,
            "SC",
            "PURCHASE_ORDER",
            json!({
                "amount": 100.0,
                "quantity": 10.0,
                "confidence": 0.9,
                "available_budget": 1000.0,
                "available_storage": 50.0,
            })
            .as_object()
            .unwrap()
            .clone(),
        )
    }

    #[tokio::test]
    async fn construction_has_a_committed_genesis_block() {
        let ledger = Ledger::new(LedgerConfig {
            difficulty: 0,
            ..Default::default()
        });
        let stats = ledger.stats().await;
        assert_eq!(stats.total_blocks, 1);
        assert!(stats.chain_valid);
    }

    #[tokio::test]
    async fn submit_then_commit_moves_tx_from_pending_to_block() {
        let ledger = Ledger::new(LedgerConfig {
            difficulty: 0,
            ..Default::default()
        });
        let report = ledger.submit(sample_tx("tx-1")).await;
        assert!(report.valid);
        assert_eq!(ledger.stats().await.pending, 1);

        let block = ledger.commit().await.unwrap().unwrap();
        assert_eq!(block.transactions().len(), 1);
        assert_eq!(ledger.stats().await.pending, 0);
    }

    #[tokio::test]
    async fn commit_on_empty_pool_returns_none() {
        let ledger = Ledger::new(LedgerConfig {
            difficulty: 0,
            ..Default::default()
        });
        assert!(ledger.commit().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_submission_is_rejected() {
        let ledger = Ledger::new(LedgerConfig {
            difficulty: 0,
            ..Default::default()
        });
        ledger.submit(sample_tx("dup")).await;
        let second = ledger.submit(sample_tx("dup")).await;
        assert!(!second.valid);
        assert_eq!(ledger.stats().await.pending, 1);
    }

    #[tokio::test]
    async fn rejected_transaction_never_appears_in_a_block() {
        let ledger = Ledger::new(LedgerConfig {
            difficulty: 0,
            ..Default::default()
        });
        let mut bad = sample_tx("bad");
        bad.details.insert("confidence".to_string(), json!(0.1));
        let report = ledger.submit(bad).await;
        assert!(!report.valid);
        assert!(ledger.commit().await.unwrap().is_none());
        assert!(ledger.find_transaction("bad").await.is_none());
    }

    #[tokio::test]
    async fn out_of_range_get_block_is_not_found() {
        let ledger = Ledger::new(LedgerConfig::default());
        assert!(matches!(
            ledger.get_block(99).await,
            Err(LedgerError::BlockNotFound { index: 99 })
        ));
    }

    #[tokio::test]
    async fn reset_wipes_state_and_rebuilds_genesis() {
        let ledger = Ledger::new(LedgerConfig {
            difficulty: 0,
            ..Default::default()
        });
        ledger.submit(sample_tx("tx-1")).await;
        ledger.commit().await.unwrap();
        ledger.reset().await;
        let stats = ledger.stats().await;
        assert_eq!(stats.total_blocks, 1);
        assert_eq!(stats.total_transactions, 0);
    }

    #[tokio::test]
    async fn batch_size_caps_transactions_per_block() {
        let ledger = Ledger::new(LedgerConfig {
            difficulty: 0,
            batch_size: 2,
            ..Default::default()
        });
        for i in 0..5 {
            ledger.submit(sample_tx(&format!("tx-{i}"))).await;
        }
        let block = ledger.commit().await.unwrap().unwrap();
        assert_eq!(block.transactions().len(), 2);
        assert_eq!(ledger.stats().await.pending, 3);
    }

    #[tokio::test]
    async fn tampering_with_a_committed_block_is_detected() {
        let ledger = Ledger::new(LedgerConfig {
            difficulty: 0,
            ..Default::default()
        });
        ledger.submit(sample_tx("tx-1")).await;
        ledger.commit().await.unwrap();

        {
            let mut state = ledger.state.write().await;
            if let BlockPayload::Transactions(txs) = &mut state.blocks[1].payload {
                txs[0].details.insert("amount".to_string(), json!(999999.0));
            }
        }

        let report = ledger.validate().await;
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("block 1")));
    }
}
