use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use coord_crypto::sha256;
use serde::{Deserialize, Serialize};

/// Genesis carries a fixed descriptor payload; every later block carries an
/// ordered batch of committed transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockPayload {
    Genesis { note: String },
    Transactions(Vec<Transaction>),
}

/// An immutable, hash-chained block. Never mutated after `mine` produces its
/// final `hash`; destroyed only by an explicit ledger `reset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: String,
    pub payload: BlockPayload,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// Build the genesis block (index 0, empty previous hash) and mine it
    /// under the given difficulty.
    pub fn genesis(difficulty: u32) -> Self {
        Self::mine(
            0,
            String::new(),
            BlockPayload::Genesis {
                note: "genesis block".to_string(),
            },
            difficulty,
        )
    }

    /// Mine a block at `index` linking to `previous_hash`, incrementing
    /// `nonce` from zero until the resulting hash satisfies `difficulty`
    /// leading hex-zero characters. `difficulty == 0` accepts the first
    /// attempt.
    pub fn mine(index: u64, previous_hash: String, payload: BlockPayload, difficulty: u32) -> Self {
        let timestamp = Utc::now();
        let mut nonce: u64 = 0;
        loop {
            let hash = canonical_hash(index, timestamp, &payload, &previous_hash, nonce);
            if meets_difficulty(&hash, difficulty) {
                return Self {
                    index,
                    timestamp,
                    previous_hash,
                    payload,
                    nonce,
                    hash,
                };
            }
            nonce += 1;
        }
    }

    /// Recompute the hash this block *should* have, given its current
    /// fields. Used by chain validation to detect tampering: a committed
    /// block's stored `hash` must always match this.
    pub fn recompute_hash(&self) -> String {
        canonical_hash(
            self.index,
            self.timestamp,
            &self.payload,
            &self.previous_hash,
            self.nonce,
        )
    }

    pub fn transactions(&self) -> &[Transaction] {
        match &self.payload {
            BlockPayload::Genesis { .. } => &[],
            BlockPayload::Transactions(txs) => txs,
        }
    }
}

/// Canonical encoding per the hash format: decimal index, RFC3339 timestamp,
/// JSON payload (object keys lexicographically sorted — the default
/// behavior of `serde_json::Map`, which is `BTreeMap`-backed unless the
/// `preserve_order` feature is enabled, which this workspace never does),
/// previous hash, decimal nonce. Hashed with SHA-256, hex lowercase.
fn canonical_hash(
    index: u64,
    timestamp: DateTime<Utc>,
    payload: &BlockPayload,
    previous_hash: &str,
    nonce: u64,
) -> String {
    let mut buf = String::new();
    buf.push_str(&index.to_string());
    buf.push_str(&timestamp.to_rfc3339());
    buf.push_str(&serde_json::to_string(payload).expect("block payload is always serializable"));
    buf.push_str(previous_hash);
    buf.push_str(&nonce.to_string());
    sha256(buf.as_bytes()).to_hex()
}

fn meets_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash_hex.len() >= difficulty && hash_hex.as_bytes()[..difficulty].iter().all(|&b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_has_empty_previous_hash_and_index_zero() {
        let genesis = Block::genesis(0);
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "");
        assert!(matches!(genesis.payload, BlockPayload::Genesis { .. }));
    }

    #[test]
    fn mined_hash_matches_recomputed_hash() {
        let block = Block::mine(1, "abc".to_string(), BlockPayload::Transactions(vec![]), 0);
        assert_eq!(block.hash, block.recompute_hash());
    }

    #[test]
    fn difficulty_zero_accepts_first_attempt() {
        let block = Block::mine(1, String::new(), BlockPayload::Transactions(vec![]), 0);
        assert_eq!(block.nonce, 0);
    }

    #[test]
    fn difficulty_two_produces_two_leading_zero_hex_chars() {
        let block = Block::mine(1, String::new(), BlockPayload::Transactions(vec![]), 2);
        assert!(block.hash.starts_with("00"));
    }

    #[test]
    fn tampering_with_payload_breaks_hash_match() {
        let mut block = Block::mine(1, String::new(), BlockPayload::Transactions(vec![]), 0);
        block.payload = BlockPayload::Genesis {
            note: "tampered".to_string(),
        };
        assert_ne!(block.hash, block.recompute_hash());
    }
}
