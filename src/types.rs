/// Core chain-agnostic data model: the RPC-shaped `Block` and the minimal
/// `BlockFingerprint` projection the cache and detector actually compare.
use serde::{Deserialize, Serialize};

/// One transaction as reported by the node. Only the hash is needed for
/// reorg detection; everything else is carried through to `BLOCK_RECEIVED`
/// payloads for operator visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
}

/// A full block as returned by `get_block_latest` / `get_block_by_number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub state_root: Option<String>,
    pub base_fee_per_gas: Option<u64>,
    pub gas_used: Option<u64>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn tx_hashes(&self) -> Vec<String> {
        self.transactions.iter().map(|t| t.hash.clone()).collect()
    }

    pub fn fingerprint(&self) -> BlockFingerprint {
        BlockFingerprint {
            hash: self.hash.clone(),
            parent_hash: self.parent_hash.clone(),
            state_root: self.state_root.clone(),
            tx_hashes: self.tx_hashes(),
        }
    }
}

/// The cached projection of a block at one height (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFingerprint {
    pub hash: String,
    pub parent_hash: String,
    pub state_root: Option<String>,
    pub tx_hashes: Vec<String>,
}

/// Multiset difference of two ordered hash sequences: `dropped` is what's in
/// `old` but not matched in `new`, `added` is the reverse. Order is
/// preserved from each side; duplicates on one side that aren't matched by a
/// duplicate on the other are reported once per unmatched occurrence.
pub fn diff_tx_hashes(old: &[String], new: &[String]) -> (Vec<String>, Vec<String>) {
    let mut new_remaining: Vec<&String> = new.iter().collect();
    let mut dropped = Vec::new();
    for h in old {
        if let Some(pos) = new_remaining.iter().position(|n| *n == h) {
            new_remaining.remove(pos);
        } else {
            dropped.push(h.clone());
        }
    }

    let mut old_remaining: Vec<&String> = old.iter().collect();
    let mut added = Vec::new();
    for h in new {
        if let Some(pos) = old_remaining.iter().position(|o| *o == h) {
            old_remaining.remove(pos);
        } else {
            added.push(h.clone());
        }
    }

    (dropped, added)
}
