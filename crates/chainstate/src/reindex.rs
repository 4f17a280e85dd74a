//! Rebuilds the chain index from persisted blocks.
//!
//! Replay starts from an empty registry: runtime sporks are not restored.
//! Each block's stored mode tag decides its classification, so history keeps
//! the verdicts it was accepted with.

use std::fmt;
use std::sync::Arc;

use hybridd_consensus::{hash256_to_hex, Hash256};
use hybridd_log::{log_category, log_info, Category};
use hybridd_primitives::block::Block;
use hybridd_spork::SporkRegistry;
use hybridd_storage::{KeyValueStore, StoreError};

use crate::blockstore::BlockRecord;
use crate::checkpoints::CheckpointTable;
use crate::index::ChainIndex;
use crate::validation::ConsensusRules;

const PROGRESS_INTERVAL: usize = 10_000;

#[derive(Debug)]
pub enum FatalError {
    /// The store contradicts itself; startup cannot continue.
    StoreCorrupt(String),
    Store(StoreError),
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::StoreCorrupt(message) => write!(f, "block store corrupt: {message}"),
            FatalError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for FatalError {}

impl From<StoreError> for FatalError {
    fn from(err: StoreError) -> Self {
        FatalError::Store(err)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReindexStats {
    pub replayed: usize,
    /// Stored blocks that no longer pass (for example under a changed
    /// static checkpoint). They stay on disk but are not indexed.
    pub rejected: usize,
}

pub struct ReindexDriver<S> {
    store: Arc<S>,
    rules: ConsensusRules,
    checkpoints: CheckpointTable,
    check_proofs: bool,
}

impl<S: KeyValueStore> ReindexDriver<S> {
    pub fn new(store: Arc<S>, rules: ConsensusRules, checkpoints: CheckpointTable) -> Self {
        Self {
            store,
            rules,
            checkpoints,
            check_proofs: true,
        }
    }

    /// Skips proof checks for stored blocks; used for a normal restart where
    /// the store was written by this node.
    pub fn trust_stored_proofs(mut self) -> Self {
        self.check_proofs = false;
        self
    }

    /// Resets `registry`, then replays every stored block ordered by height
    /// and original arrival.
    pub fn rebuild(
        self,
        registry: &mut SporkRegistry,
        now: i64,
    ) -> Result<(ChainIndex<S>, ReindexStats), FatalError> {
        registry.reset();
        let mut checkpoints = self.checkpoints;
        checkpoints.clear_sporks();
        let mut index = ChainIndex::new(self.store, self.rules, checkpoints);

        let mut records = Vec::new();
        for (hash, record) in index.block_store().records()? {
            let record = record
                .map_err(|err| FatalError::StoreCorrupt(format!("{}: {err}", hash256_to_hex(&hash))))?;
            records.push((hash, record));
        }
        records.sort_by_key(|(_, record)| (record.height, record.arrival));
        log_category!(
            Category::Reindex,
            "replaying {} stored blocks",
            records.len()
        );

        let mut stats = ReindexStats::default();
        for (position, (hash, record)) in records.iter().enumerate() {
            let block = load_checked(&index, hash, record)?;
            match index.replay(&block, record, now, registry, self.check_proofs) {
                Ok(_) => stats.replayed += 1,
                Err(reason) => {
                    stats.rejected += 1;
                    log_category!(
                        Category::Reindex,
                        "stored block {} at height {} no longer accepted: {reason}",
                        hash256_to_hex(hash),
                        record.height
                    );
                }
            }
            if (position + 1) % PROGRESS_INTERVAL == 0 {
                log_info!("reindex: {}/{} blocks", position + 1, records.len());
            }
        }

        let tip = index.tip();
        log_info!(
            "reindex done: {} replayed, {} rejected, tip {} height {} ({})",
            stats.replayed,
            stats.rejected,
            hash256_to_hex(&tip.hash),
            tip.height,
            tip.mode
        );
        Ok((index, stats))
    }
}

fn load_checked<S: KeyValueStore>(
    index: &ChainIndex<S>,
    hash: &Hash256,
    record: &BlockRecord,
) -> Result<Block, FatalError> {
    let corrupt = |what: &str| FatalError::StoreCorrupt(format!("{}: {what}", hash256_to_hex(hash)));
    let bytes = index
        .block_store()
        .block_bytes(hash)?
        .ok_or_else(|| corrupt("indexed block has no data"))?;
    let block = Block::from_bytes(&bytes).map_err(|err| corrupt(&format!("undecodable block: {err}")))?;
    if block.hash() != *hash {
        return Err(corrupt("block data hashes to a different id"));
    }
    if block.header.prev_block != record.parent || block.height() != record.height {
        return Err(corrupt("record disagrees with block header"));
    }
    if block.mode() != record.mode {
        return Err(corrupt("stored mode tag disagrees with block header"));
    }
    Ok(block)
}
