//! Minimal transaction pool.
//!
//! Inputs are not looked up against a UTXO set here; the pool only tracks
//! in-pool conflicts and the consensus filters applied at admission.

use std::collections::{HashMap, HashSet};

use hybridd_consensus::{hash256_to_hex, Hash256};
use hybridd_primitives::block::Block;
use hybridd_primitives::encoding::encode;
use hybridd_primitives::outpoint::OutPoint;
use hybridd_primitives::transaction::Transaction;

pub const DEFAULT_MEMPOOL_MAX_BYTES: usize = 300 * 1024 * 1024;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MempoolErrorKind {
    AlreadyInMempool,
    ConflictingInput,
    MempoolFull,
    InvalidTransaction,
    /// Spends from a blacklisted script.
    Blacklisted,
}

#[derive(Clone, Debug)]
pub struct MempoolError {
    pub kind: MempoolErrorKind,
    pub message: String,
}

impl MempoolError {
    pub fn new(kind: MempoolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Short reject code reported to the submitter.
    pub fn code(&self) -> &'static str {
        match self.kind {
            MempoolErrorKind::AlreadyInMempool => "txn-already-in-mempool",
            MempoolErrorKind::ConflictingInput => "txn-mempool-conflict",
            MempoolErrorKind::MempoolFull => "mempool-full",
            MempoolErrorKind::InvalidTransaction => "bad-txns",
            MempoolErrorKind::Blacklisted => "blacklisted-input",
        }
    }
}

impl std::fmt::Display for MempoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)
    }
}

impl std::error::Error for MempoolError {}

#[derive(Clone, Debug)]
pub struct MempoolEntry {
    pub txid: Hash256,
    pub tx: Transaction,
    pub size: usize,
    pub time: i64,
    /// Admission order; block templates take entries oldest first.
    pub sequence: u64,
}

#[derive(Debug)]
pub struct Mempool {
    entries: HashMap<Hash256, MempoolEntry>,
    spent: HashMap<OutPoint, Hash256>,
    total_bytes: usize,
    max_bytes: usize,
    next_sequence: u64,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(DEFAULT_MEMPOOL_MAX_BYTES)
    }
}

impl Mempool {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            spent: HashMap::new(),
            total_bytes: 0,
            max_bytes,
            next_sequence: 0,
        }
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn get(&self, txid: &Hash256) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    /// Transactions in admission order.
    pub fn transactions(&self) -> Vec<Transaction> {
        let mut entries: Vec<&MempoolEntry> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.sequence);
        entries.into_iter().map(|entry| entry.tx.clone()).collect()
    }

    pub fn insert(&mut self, tx: Transaction, now: i64) -> Result<Hash256, MempoolError> {
        let txid = tx.txid();
        if self.entries.contains_key(&txid) {
            return Err(MempoolError::new(
                MempoolErrorKind::AlreadyInMempool,
                "transaction already in mempool",
            ));
        }
        for input in &tx.vin {
            if let Some(conflict) = self.spent.get(&input.prevout) {
                return Err(MempoolError::new(
                    MempoolErrorKind::ConflictingInput,
                    format!(
                        "input {} already spent by {}",
                        input.prevout,
                        hash256_to_hex(conflict)
                    ),
                ));
            }
        }
        let size = encode(&tx).len();
        if self.max_bytes > 0 && self.total_bytes.saturating_add(size) > self.max_bytes {
            return Err(MempoolError::new(MempoolErrorKind::MempoolFull, "mempool full"));
        }

        for input in &tx.vin {
            self.spent.insert(input.prevout.clone(), txid);
        }
        self.total_bytes = self.total_bytes.saturating_add(size);
        self.entries.insert(
            txid,
            MempoolEntry {
                txid,
                tx,
                size,
                time: now,
                sequence: self.next_sequence,
            },
        );
        self.next_sequence += 1;
        Ok(txid)
    }

    pub fn remove(&mut self, txid: &Hash256) -> Option<MempoolEntry> {
        let entry = self.entries.remove(txid)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.size);
        for input in &entry.tx.vin {
            if self.spent.get(&input.prevout) == Some(txid) {
                self.spent.remove(&input.prevout);
            }
        }
        Some(entry)
    }

    /// Drops transactions the block confirmed or double-spent.
    pub fn remove_for_block(&mut self, block: &Block) -> usize {
        let mut doomed: HashSet<Hash256> = HashSet::new();
        for tx in &block.transactions {
            let txid = tx.txid();
            if self.entries.contains_key(&txid) {
                doomed.insert(txid);
            }
            for input in &tx.vin {
                if let Some(spender) = self.spent.get(&input.prevout) {
                    doomed.insert(*spender);
                }
            }
        }
        for txid in &doomed {
            self.remove(txid);
        }
        doomed.len()
    }

    /// Removes every entry matching `predicate`. Returns the removed ids.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<Hash256>
    where
        F: FnMut(&Transaction) -> bool,
    {
        let doomed: Vec<Hash256> = self
            .entries
            .values()
            .filter(|entry| predicate(&entry.tx))
            .map(|entry| entry.txid)
            .collect();
        for txid in &doomed {
            self.remove(txid);
        }
        doomed
    }
}
