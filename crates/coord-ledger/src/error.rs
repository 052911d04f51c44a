use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("duplicate transaction: {id}")]
    DuplicateTransaction { id: String },

    #[error("block not found at index {index}")]
    BlockNotFound { index: u64 },

    #[error("transaction not found: {id}")]
    TransactionNotFound { id: String },

    #[error("internal invariant violated while committing: {reason}")]
    CommitInvariantViolated { reason: String },
}
