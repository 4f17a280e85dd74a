//! Block tree, cumulative work, and active chain selection.
//!
//! Every accepted block lives in an arena addressed by [`BlockHandle`] and is
//! never removed. The active chain is the highest-work block whose ancestry
//! satisfies every active checkpoint; equal work goes to the block seen first.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use hybridd_consensus::constants::{MAX_FAILED_BLOCKS, MEDIAN_TIME_SPAN};
use hybridd_consensus::{hash256_to_hex, Hash256};
use hybridd_log::{log_category, log_debug, log_error, log_info, Category};
use hybridd_pow::difficulty::block_proof;
use hybridd_primitives::block::{Block, BlockMode};
use hybridd_primitives::genesis_block;
use hybridd_spork::SporkRegistry;
use hybridd_storage::{KeyValueStore, StoreError, WriteBatch};
use primitive_types::U256;

use crate::blockstore::{BlockRecord, BlockStore};
use crate::checkpoints::CheckpointTable;
use crate::validation::{ConsensusRules, RejectReason};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHandle(u32);

impl BlockHandle {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
struct BlockNode {
    hash: Hash256,
    parent: Option<BlockHandle>,
    skip: Option<BlockHandle>,
    height: i64,
    time: i64,
    mode: BlockMode,
    chainwork: U256,
    arrival: u64,
    children: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TipChange {
    Extended,
    /// New tip and the height of the last block it shares with the old one.
    ReorgTo(Hash256, i64),
    NoChange,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainTip {
    pub hash: Hash256,
    pub height: i64,
    pub time: i64,
    pub mode: BlockMode,
    pub chainwork: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub hash: Hash256,
    pub parent: Option<Hash256>,
    pub height: i64,
    pub time: i64,
    pub mode: BlockMode,
    pub chainwork: U256,
    pub arrival: u64,
    pub in_active_chain: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TipStatus {
    Active,
    ValidFork,
    /// Disagrees with an active checkpoint.
    CheckpointRejected,
}

impl TipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TipStatus::Active => "active",
            TipStatus::ValidFork => "valid-fork",
            TipStatus::CheckpointRejected => "invalid-checkpoint",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TipInfo {
    pub hash: Hash256,
    pub height: i64,
    /// Blocks between this tip and the active chain.
    pub branch_len: i64,
    pub status: TipStatus,
}

#[derive(Clone, Copy, Debug)]
enum Admission {
    Live { proof_checked: bool },
    /// Stored mode tag and arrival order are authoritative.
    Replay {
        mode: BlockMode,
        arrival: u64,
        check_proof: bool,
    },
}

/// Hashes known to be invalid, oldest forgotten first once full.
#[derive(Debug)]
struct FailedBlocks {
    capacity: usize,
    order: VecDeque<Hash256>,
    members: HashSet<Hash256>,
}

impl FailedBlocks {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    fn contains(&self, hash: &Hash256) -> bool {
        self.members.contains(hash)
    }

    fn insert(&mut self, hash: Hash256) {
        if self.capacity == 0 || !self.members.insert(hash) {
            return;
        }
        self.order.push_back(hash);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

pub struct ChainIndex<S> {
    store: BlockStore<S>,
    rules: ConsensusRules,
    checkpoints: CheckpointTable,
    nodes: Vec<BlockNode>,
    by_hash: HashMap<Hash256, BlockHandle>,
    /// Height -> handle along the active chain.
    active: Vec<BlockHandle>,
    /// Every block ranked by (work, earliest arrival).
    ranked: BTreeSet<(U256, Reverse<u64>, BlockHandle)>,
    failed: FailedBlocks,
    next_arrival: u64,
}

fn invert_lowest_one(value: i64) -> i64 {
    value & value.saturating_sub(1)
}

fn get_skip_height(height: i64) -> i64 {
    if height < 2 {
        0
    } else if (height & 1) != 0 {
        invert_lowest_one(invert_lowest_one(height - 1)) + 1
    } else {
        invert_lowest_one(height)
    }
}

impl<S: KeyValueStore> ChainIndex<S> {
    /// An index holding only the network's genesis block.
    pub fn new(store: Arc<S>, rules: ConsensusRules, checkpoints: CheckpointTable) -> Self {
        let genesis = genesis_block(rules.params());
        let genesis_node = BlockNode {
            hash: genesis.hash(),
            parent: None,
            skip: None,
            height: 0,
            time: genesis.time(),
            mode: BlockMode::ProofOfWork,
            chainwork: block_proof(genesis.header.bits).unwrap_or_default(),
            arrival: 0,
            children: 0,
        };
        let handle = BlockHandle(0);
        let mut ranked = BTreeSet::new();
        ranked.insert((genesis_node.chainwork, Reverse(0), handle));
        Self {
            store: BlockStore::new(store),
            rules,
            checkpoints,
            by_hash: HashMap::from([(genesis_node.hash, handle)]),
            nodes: vec![genesis_node],
            active: vec![handle],
            ranked,
            failed: FailedBlocks::new(MAX_FAILED_BLOCKS),
            next_arrival: 1,
        }
    }

    pub fn rules(&self) -> &ConsensusRules {
        &self.rules
    }

    pub fn checkpoints(&self) -> &CheckpointTable {
        &self.checkpoints
    }

    /// Mutable pins; call [`ChainIndex::refresh`] afterwards.
    pub fn checkpoints_mut(&mut self) -> &mut CheckpointTable {
        &mut self.checkpoints
    }

    pub fn block_store(&self) -> &BlockStore<S> {
        &self.store
    }

    /// Validates `block` and, if acceptable, inserts it, persists it, and
    /// recomputes the active tip.
    pub fn try_accept(
        &mut self,
        block: &Block,
        now: i64,
        registry: &SporkRegistry,
    ) -> Result<TipChange, RejectReason> {
        self.accept(block, now, registry, Admission::Live { proof_checked: false })
    }

    /// As [`ChainIndex::try_accept`] for a block whose proof was already
    /// checked with [`ConsensusRules::check_proof`].
    pub fn try_accept_prechecked(
        &mut self,
        block: &Block,
        now: i64,
        registry: &SporkRegistry,
    ) -> Result<TipChange, RejectReason> {
        self.accept(block, now, registry, Admission::Live { proof_checked: true })
    }

    /// Re-admits a stored block using its recorded mode tag and arrival
    /// order. The future-time limit does not apply.
    pub(crate) fn replay(
        &mut self,
        block: &Block,
        record: &BlockRecord,
        now: i64,
        registry: &SporkRegistry,
        check_proof: bool,
    ) -> Result<TipChange, RejectReason> {
        self.accept(
            block,
            now,
            registry,
            Admission::Replay {
                mode: record.mode,
                arrival: record.arrival,
                check_proof,
            },
        )
    }

    fn accept(
        &mut self,
        block: &Block,
        now: i64,
        registry: &SporkRegistry,
        admission: Admission,
    ) -> Result<TipChange, RejectReason> {
        let hash = block.hash();
        let result = self.admit(&hash, block, now, registry, admission);
        match &result {
            Err(RejectReason::MissingParent) => log_debug!(
                "block {} waits for parent {}",
                hash256_to_hex(&hash),
                hash256_to_hex(&block.header.prev_block)
            ),
            Err(RejectReason::CheckpointViolation) => log_category!(
                Category::Checkpoint,
                "block {} at height {} conflicts with a checkpoint",
                hash256_to_hex(&hash),
                block.height()
            ),
            Err(reason) => log_info!(
                "rejected block {} at height {}: {reason}",
                hash256_to_hex(&hash),
                block.height()
            ),
            Ok(_) => {}
        }
        result
    }

    fn admit(
        &mut self,
        hash: &Hash256,
        block: &Block,
        now: i64,
        registry: &SporkRegistry,
        admission: Admission,
    ) -> Result<TipChange, RejectReason> {
        if self.by_hash.contains_key(hash) {
            return Ok(TipChange::NoChange);
        }
        if self.failed.contains(hash) {
            return Err(RejectReason::InvalidProof);
        }
        self.rules.check_structure(block)?;

        let prev = block.header.prev_block;
        let Some(&parent) = self.by_hash.get(&prev) else {
            if self.failed.contains(&prev) {
                self.failed.insert(*hash);
                return Err(RejectReason::BadAncestry);
            }
            return Err(RejectReason::MissingParent);
        };
        let (parent_height, parent_mode, parent_work) = {
            let node = self.node(parent);
            (node.height, node.mode, node.chainwork)
        };
        let height = block.height();
        if height != parent_height + 1 {
            return Err(RejectReason::BadAncestry);
        }
        if block.time() <= self.median_time_past_at(parent) {
            return Err(RejectReason::Malformed("time-too-old"));
        }

        let (mode, arrival, check_proof) = match admission {
            Admission::Live { proof_checked } => {
                let required = self.rules.classify(block, parent_mode, registry);
                if block.mode() != required {
                    log_category!(
                        Category::Stake,
                        "height {height} requires {required}, block is {}",
                        block.mode()
                    );
                    return Err(RejectReason::InvalidProof);
                }
                if block.time() > self.rules.max_block_time(required, now) {
                    return Err(RejectReason::Malformed("time-too-new"));
                }
                (required, self.next_arrival, !proof_checked)
            }
            Admission::Replay {
                mode,
                arrival,
                check_proof,
            } => {
                // Stake mode never reverts along a branch.
                if parent_mode == BlockMode::ProofOfStake && mode != BlockMode::ProofOfStake {
                    return Err(RejectReason::InvalidProof);
                }
                (mode, arrival, check_proof)
            }
        };

        let satisfied = self.checkpoints.is_satisfied(now, height, |at| {
            if at == height {
                Some(*hash)
            } else {
                self.ancestor(parent, at).map(|handle| self.node(handle).hash)
            }
        });
        if !satisfied {
            return Err(RejectReason::CheckpointViolation);
        }

        if check_proof {
            if let Err(reason) = self.rules.check_proof(&block.header) {
                self.failed.insert(*hash);
                return Err(reason);
            }
        }
        if self.rules.block_blocked(block, registry) {
            return Err(RejectReason::Blacklisted);
        }

        let work = block_proof(block.header.bits).map_err(|_| RejectReason::InvalidProof)?;
        let index = u32::try_from(self.nodes.len())
            .map_err(|_| RejectReason::Malformed("block index full"))?;
        let handle = BlockHandle(index);
        let node = BlockNode {
            hash: *hash,
            parent: Some(parent),
            skip: self.ancestor(parent, get_skip_height(height)),
            height,
            time: block.time(),
            mode,
            chainwork: parent_work.saturating_add(work),
            arrival,
            children: 0,
        };

        if matches!(admission, Admission::Live { .. }) {
            self.persist(block, &node, &prev);
        }

        self.nodes[parent.index()].children += 1;
        self.ranked.insert((node.chainwork, Reverse(arrival), handle));
        self.by_hash.insert(*hash, handle);
        self.nodes.push(node);
        self.next_arrival = self.next_arrival.max(arrival + 1);

        Ok(self.update_tip(now))
    }

    fn persist(&self, block: &Block, node: &BlockNode, parent: &Hash256) {
        let record = BlockRecord {
            height: node.height,
            parent: *parent,
            mode: node.mode,
            arrival: node.arrival,
        };
        let mut batch = WriteBatch::new();
        self.store.put_block(&mut batch, &node.hash, &record, block);
        if let Err(err) = self.store.commit(&batch) {
            // The block stays valid in memory; it is lost on the next reindex.
            log_error!(
                "failed to persist block {}: {err}",
                hash256_to_hex(&node.hash)
            );
        }
    }

    /// Re-runs tip selection, e.g. after checkpoints changed or activated.
    pub fn refresh(&mut self, now: i64) -> TipChange {
        self.update_tip(now)
    }

    fn update_tip(&mut self, now: i64) -> TipChange {
        let best = self.select_best(now);
        let old = self.tip_handle();
        if best == old {
            return TipChange::NoChange;
        }
        let fork = self.fork_point(old, best);
        let fork_height = self.node(fork).height;

        let mut path = Vec::new();
        let mut cursor = Some(best);
        while let Some(handle) = cursor {
            if handle == fork {
                break;
            }
            path.push(handle);
            cursor = self.node(handle).parent;
        }
        self.active.truncate(fork_height as usize + 1);
        self.active.extend(path.into_iter().rev());

        let tip = self.node(best);
        if fork == old {
            log_debug!(
                "tip extended to {} height {} ({})",
                hash256_to_hex(&tip.hash),
                tip.height,
                tip.mode
            );
            TipChange::Extended
        } else {
            log_info!(
                "reorganized to {} height {} ({}), fork at {fork_height}",
                hash256_to_hex(&tip.hash),
                tip.height,
                tip.mode
            );
            TipChange::ReorgTo(tip.hash, fork_height)
        }
    }

    fn select_best(&self, now: i64) -> BlockHandle {
        self.ranked
            .iter()
            .rev()
            .map(|(_, _, handle)| *handle)
            .find(|handle| self.satisfies_checkpoints(*handle, now))
            .unwrap_or(BlockHandle(0))
    }

    fn satisfies_checkpoints(&self, handle: BlockHandle, now: i64) -> bool {
        self.checkpoints
            .is_satisfied(now, self.node(handle).height, |height| {
                self.ancestor(handle, height)
                    .map(|ancestor| self.node(ancestor).hash)
            })
    }

    fn node(&self, handle: BlockHandle) -> &BlockNode {
        &self.nodes[handle.index()]
    }

    fn tip_handle(&self) -> BlockHandle {
        self.active.last().copied().unwrap_or(BlockHandle(0))
    }

    /// Ancestor of `handle` at `height`, following skip pointers.
    fn ancestor(&self, handle: BlockHandle, height: i64) -> Option<BlockHandle> {
        let mut current = handle;
        let mut node = self.node(current);
        if height < 0 || height > node.height {
            return None;
        }
        while node.height > height {
            let skip_height = get_skip_height(node.height);
            current = match node.skip {
                Some(skip) if skip_height >= height => skip,
                _ => node.parent?,
            };
            node = self.node(current);
        }
        Some(current)
    }

    fn fork_point(&self, a: BlockHandle, b: BlockHandle) -> BlockHandle {
        let height = self.node(a).height.min(self.node(b).height);
        let (Some(mut a), Some(mut b)) = (self.ancestor(a, height), self.ancestor(b, height)) else {
            return BlockHandle(0);
        };
        while a != b {
            match (self.node(a).parent, self.node(b).parent) {
                (Some(pa), Some(pb)) => {
                    a = pa;
                    b = pb;
                }
                _ => return BlockHandle(0),
            }
        }
        a
    }

    fn median_time_past_at(&self, handle: BlockHandle) -> i64 {
        let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN);
        let mut cursor = Some(handle);
        while let Some(current) = cursor {
            if times.len() == MEDIAN_TIME_SPAN {
                break;
            }
            let node = self.node(current);
            times.push(node.time);
            cursor = node.parent;
        }
        times.sort_unstable();
        times[times.len() / 2]
    }

    /// Median time of the eleven blocks ending at `hash`.
    pub fn median_time_past(&self, hash: &Hash256) -> Option<i64> {
        let handle = self.by_hash.get(hash)?;
        Some(self.median_time_past_at(*handle))
    }

    pub fn tip(&self) -> ChainTip {
        let node = self.node(self.tip_handle());
        ChainTip {
            hash: node.hash,
            height: node.height,
            time: node.time,
            mode: node.mode,
            chainwork: node.chainwork,
        }
    }

    pub fn is_stake_active(&self) -> bool {
        self.node(self.tip_handle()).mode == BlockMode::ProofOfStake
    }

    /// Mode the next block on the active tip must carry if stamped `time`.
    pub fn next_mode(&self, time: i64, registry: &SporkRegistry) -> BlockMode {
        let tip = self.node(self.tip_handle());
        self.rules
            .required_mode(tip.mode, tip.height + 1, time, registry)
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn mode_of(&self, hash: &Hash256) -> Option<BlockMode> {
        self.by_hash.get(hash).map(|handle| self.node(*handle).mode)
    }

    pub fn hash_at_height(&self, height: i64) -> Option<Hash256> {
        let index = usize::try_from(height).ok()?;
        self.active.get(index).map(|handle| self.node(*handle).hash)
    }

    pub fn block_by_hash(&self, hash: &Hash256) -> Option<BlockInfo> {
        let handle = *self.by_hash.get(hash)?;
        let node = self.node(handle);
        Some(BlockInfo {
            hash: node.hash,
            parent: node.parent.map(|parent| self.node(parent).hash),
            height: node.height,
            time: node.time,
            mode: node.mode,
            chainwork: node.chainwork,
            arrival: node.arrival,
            in_active_chain: self.active.get(node.height as usize) == Some(&handle),
        })
    }

    /// Full block from the store; genesis is rebuilt from parameters.
    pub fn block(&self, hash: &Hash256) -> Result<Option<Block>, StoreError> {
        if *hash == self.node(BlockHandle(0)).hash {
            return Ok(Some(genesis_block(self.rules.params())));
        }
        self.store.block(hash)
    }

    /// Every leaf of the tree plus the active tip, highest first.
    pub fn chain_tips(&self, now: i64) -> Vec<TipInfo> {
        let tip = self.tip_handle();
        let mut tips: Vec<TipInfo> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(index, node)| node.children == 0 || *index == tip.index())
            .map(|(index, node)| {
                let handle = BlockHandle(index as u32);
                let fork = self.fork_point(tip, handle);
                let status = if handle == tip {
                    TipStatus::Active
                } else if self.satisfies_checkpoints(handle, now) {
                    TipStatus::ValidFork
                } else {
                    TipStatus::CheckpointRejected
                };
                TipInfo {
                    hash: node.hash,
                    height: node.height,
                    branch_len: node.height - self.node(fork).height,
                    status,
                }
            })
            .collect();
        tips.sort_by(|a, b| b.height.cmp(&a.height));
        tips
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_hashes_stay_bounded() {
        let mut failed = FailedBlocks::new(3);
        for tag in 0..5u8 {
            failed.insert([tag; 32]);
        }
        failed.insert([4u8; 32]);
        assert_eq!(failed.len(), 3);
        assert!(!failed.contains(&[0u8; 32]));
        assert!(!failed.contains(&[1u8; 32]));
        assert!(failed.contains(&[2u8; 32]));
        assert!(failed.contains(&[4u8; 32]));
    }

    #[test]
    fn skip_heights_point_backwards() {
        assert_eq!(get_skip_height(0), 0);
        assert_eq!(get_skip_height(1), 0);
        assert_eq!(get_skip_height(2), 0);
        assert_eq!(get_skip_height(8), 0);
        assert_eq!(get_skip_height(12), 8);
        assert_eq!(get_skip_height(13), 1);
        assert_eq!(get_skip_height(15), 9);
        for height in 2..512 {
            assert!(get_skip_height(height) < height);
        }
    }
}
