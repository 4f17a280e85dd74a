//! Per-block consensus rules: mode classification, proofs, blacklist.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use hybridd_consensus::constants::{MAX_BLOCK_SIZE, MAX_FUTURE_BLOCK_TIME, MAX_POS_BLOCK_AHEAD_TIME};
use hybridd_consensus::ConsensusParams;
use hybridd_log::{log_category, log_debug, Category};
use hybridd_pos::validate_pos_header;
use hybridd_pow::{validate_pow_header, ProofOracle};
use hybridd_primitives::block::{Block, BlockHeader, BlockMode};
use hybridd_primitives::encoding::encode;
use hybridd_primitives::transaction::Transaction;
use hybridd_spork::SporkRegistry;
use rayon::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    InvalidProof,
    /// Parent known to be invalid, or the block does not fit on its parent.
    BadAncestry,
    /// Parent not yet seen; the block may be retried later.
    MissingParent,
    Blacklisted,
    CheckpointViolation,
    Malformed(&'static str),
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InvalidProof => "bad-proof",
            RejectReason::BadAncestry => "bad-prevblk",
            RejectReason::MissingParent => "missing-parent",
            RejectReason::Blacklisted => "blacklisted-input",
            RejectReason::CheckpointViolation => "checkpoint-mismatch",
            RejectReason::Malformed(_) => "bad-structure",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Malformed(detail) => write!(f, "{}: {detail}", self.as_str()),
            other => f.write_str(other.as_str()),
        }
    }
}

impl std::error::Error for RejectReason {}

/// Stateless rule set; live governance state is passed in per call.
#[derive(Clone)]
pub struct ConsensusRules {
    params: ConsensusParams,
    oracle: Arc<dyn ProofOracle>,
}

impl ConsensusRules {
    pub fn new(params: ConsensusParams, oracle: Arc<dyn ProofOracle>) -> Self {
        Self { params, oracle }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn oracle(&self) -> &dyn ProofOracle {
        self.oracle.as_ref()
    }

    /// Mode a block at `height` stamped `time` must carry. Stake mode is
    /// sticky: once the parent is a stake block every child is too.
    pub fn required_mode(
        &self,
        parent_mode: BlockMode,
        height: i64,
        time: i64,
        registry: &SporkRegistry,
    ) -> BlockMode {
        if parent_mode == BlockMode::ProofOfStake || height >= registry.first_pos_height(time) {
            BlockMode::ProofOfStake
        } else {
            BlockMode::ProofOfWork
        }
    }

    pub fn classify(&self, block: &Block, parent_mode: BlockMode, registry: &SporkRegistry) -> BlockMode {
        self.required_mode(parent_mode, block.height(), block.time(), registry)
    }

    /// Proof check for the mode the header declares. Depends only on the
    /// header, so it can run before the block is placed in the index.
    pub fn check_proof(&self, header: &BlockHeader) -> Result<(), RejectReason> {
        match header.mode() {
            BlockMode::ProofOfWork => {
                validate_pow_header(header, &self.params, self.oracle()).map_err(|err| {
                    log_debug!("work proof failed at height {}: {err}", header.height);
                    RejectReason::InvalidProof
                })
            }
            BlockMode::ProofOfStake => {
                validate_pos_header(header, &self.params, self.oracle()).map_err(|err| {
                    log_category!(
                        Category::Stake,
                        "stake proof failed at height {}: {err}",
                        header.height
                    );
                    RejectReason::InvalidProof
                })
            }
        }
    }

    /// Proof checks for a batch, in parallel. Results line up with `blocks`.
    pub fn check_proofs(&self, blocks: &[Block]) -> Vec<Result<(), RejectReason>> {
        blocks
            .par_iter()
            .map(|block| self.check_proof(&block.header))
            .collect()
    }

    /// Context-free structure: merkle root, coinbase placement, size, and
    /// per-transaction sanity.
    pub fn check_structure(&self, block: &Block) -> Result<(), RejectReason> {
        let Some(first) = block.transactions.first() else {
            return Err(RejectReason::Malformed("bad-blk-length"));
        };
        if !first.is_coinbase() {
            return Err(RejectReason::Malformed("bad-cb-missing"));
        }
        if block.transactions[1..].iter().any(Transaction::is_coinbase) {
            return Err(RejectReason::Malformed("bad-cb-multiple"));
        }
        if encode(block).len() > MAX_BLOCK_SIZE {
            return Err(RejectReason::Malformed("bad-blk-length"));
        }
        let mut txids = HashSet::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            tx.check().map_err(RejectReason::Malformed)?;
            if !txids.insert(tx.txid()) {
                return Err(RejectReason::Malformed("bad-txns-duplicate"));
            }
        }
        if block.compute_merkle_root() != block.header.merkle_root {
            return Err(RejectReason::Malformed("bad-txnmrklroot"));
        }
        match (block.mode(), block.header.stake.is_some()) {
            (BlockMode::ProofOfStake, false) => Err(RejectReason::Malformed("bad-stake-missing")),
            (BlockMode::ProofOfWork, true) => Err(RejectReason::Malformed("bad-stake-unexpected")),
            _ => Ok(()),
        }
    }

    /// Latest acceptable timestamp for a block of `mode` given local time.
    pub fn max_block_time(&self, mode: BlockMode, now: i64) -> i64 {
        match mode {
            BlockMode::ProofOfWork => now + MAX_FUTURE_BLOCK_TIME,
            BlockMode::ProofOfStake => now + MAX_POS_BLOCK_AHEAD_TIME,
        }
    }

    /// True if any input of `tx` spends from a script blacklisted at `as_of`.
    pub fn is_blocked(&self, tx: &Transaction, as_of: i64, registry: &SporkRegistry) -> bool {
        if !registry.has_blacklist() {
            return false;
        }
        tx.spent_scripts()
            .any(|script| registry.is_blacklisted(script, as_of))
    }

    /// Blacklist verdict for a whole block, evaluated at the block's own time.
    /// The staked output counts as a spend.
    pub fn block_blocked(&self, block: &Block, registry: &SporkRegistry) -> bool {
        if !registry.has_blacklist() {
            return false;
        }
        let as_of = block.time();
        if let Some(stake) = &block.header.stake {
            if registry.is_blacklisted(&stake.script_pubkey, as_of) {
                return true;
            }
        }
        block
            .transactions
            .iter()
            .any(|tx| self.is_blocked(tx, as_of, registry))
    }
}
