//! The node core: one serialized mutation path over the chain index, the
//! spork registry, pending blocks and the mempool.
//!
//! Readers never take the mutation lock. After every change the core
//! publishes a fresh [`ChainSnapshot`]; a reorg publishes exactly one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use hybridd_chainstate::{
    BlockInfo, ChainIndex, CheckpointEntry, ConsensusRules, OrphanPool, RejectReason, TipChange,
    TipInfo,
};
use hybridd_consensus::constants::{
    DEFAULT_MAX_ORPHAN_BLOCKS, DEFAULT_ORPHAN_EXPIRY_SECS, FIRST_POS_DISABLED,
};
use hybridd_consensus::{hash256_to_hex, Hash256};
use hybridd_log::{log_category, log_debug, log_info, log_warn, Category};
use hybridd_primitives::block::{Block, BlockMode};
use hybridd_primitives::transaction::Transaction;
use hybridd_primitives::{address_to_script_pubkey, AddressError};
use hybridd_spork::{parse_command, SporkError, SporkPayload, SporkRegistry, SporkUpdate};
use hybridd_storage::KeyValueStore;
use serde::Serialize;

use crate::clock::Clock;
use crate::ingress::{NetMessage, Relay};
use crate::mempool::{Mempool, MempoolError, MempoolErrorKind, DEFAULT_MEMPOOL_MAX_BYTES};
use crate::producer::{BlockProducer, BlockTemplate};

#[derive(Clone, Debug)]
pub struct NodeOptions {
    pub max_orphan_blocks: usize,
    pub orphan_expiry_secs: i64,
    pub mempool_max_bytes: usize,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            max_orphan_blocks: DEFAULT_MAX_ORPHAN_BLOCKS,
            orphan_expiry_secs: DEFAULT_ORPHAN_EXPIRY_SECS,
            mempool_max_bytes: DEFAULT_MEMPOOL_MAX_BYTES,
        }
    }
}

/// Published view of the active tip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainSnapshot {
    pub height: i64,
    pub hash: Hash256,
    pub time: i64,
    pub mode: BlockMode,
    pub stake_active: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired_blocks: usize,
    pub pruned_sporks: usize,
    pub evicted_transactions: usize,
    pub tip_changed: bool,
    /// When the next pending spork checkpoint comes into force.
    pub next_checkpoint_activation: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckpointInfo {
    pub height: i64,
    pub hash: String,
    pub source: &'static str,
    pub activation_time: i64,
    pub active: bool,
}

impl From<&CheckpointEntry> for CheckpointInfo {
    fn from(entry: &CheckpointEntry) -> Self {
        Self {
            height: entry.height,
            hash: hash256_to_hex(&entry.hash),
            source: entry.source.as_str(),
            activation_time: entry.activation_time,
            active: entry.active,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SporkInfo {
    pub name: &'static str,
    pub latest: i64,
    pub active: i64,
}

/// `getblockchaininfo`-style summary.
#[derive(Clone, Debug, Serialize)]
pub struct ChainInfo {
    pub chain: &'static str,
    pub blocks: i64,
    pub bestblockhash: String,
    pub mediantime: i64,
    pub chainwork: String,
    pub mode: &'static str,
    pub stake_active: bool,
    /// `None` while proof-of-stake is disabled.
    pub first_pos_height: Option<i64>,
    pub checkpoints_enforced: bool,
    pub checkpoints: Vec<CheckpointInfo>,
    pub pending_blocks: usize,
    pub mempool_size: usize,
    pub sporks: Vec<SporkInfo>,
}

struct NodeCore<S> {
    index: ChainIndex<S>,
    registry: SporkRegistry,
    orphans: OrphanPool,
    mempool: Mempool,
}

pub struct Node<S> {
    core: Mutex<NodeCore<S>>,
    snapshot: RwLock<Arc<ChainSnapshot>>,
    rules: ConsensusRules,
    clock: Arc<dyn Clock>,
    relay: Arc<dyn Relay>,
}

impl<S: KeyValueStore> NodeCore<S> {
    /// Clears mempool transactions confirmed by blocks that `change`
    /// connected to the active chain. Side-branch blocks confirm nothing.
    fn confirm_connected(
        &mut self,
        change: &TipChange,
        previous_height: i64,
        block: Option<&Block>,
    ) {
        let first = match change {
            TipChange::NoChange => return,
            TipChange::Extended => previous_height + 1,
            TipChange::ReorgTo(_, fork_height) => fork_height + 1,
        };
        let tip_height = self.index.tip().height;
        for height in first..=tip_height {
            let Some(hash) = self.index.hash_at_height(height) else {
                break;
            };
            match block {
                Some(block) if block.hash() == hash => {
                    self.mempool.remove_for_block(block);
                }
                _ => match self.index.block(&hash) {
                    Ok(Some(stored)) => {
                        self.mempool.remove_for_block(&stored);
                    }
                    Ok(None) => log_warn!(
                        "active block {} at height {height} missing from store",
                        hash256_to_hex(&hash)
                    ),
                    Err(err) => log_warn!(
                        "failed to load active block {}: {err}",
                        hash256_to_hex(&hash)
                    ),
                },
            }
        }
    }

    /// Evicts transactions whose inputs are blacklisted as of `now`.
    fn evict_blacklisted(&mut self, rules: &ConsensusRules, now: i64) -> usize {
        let NodeCore {
            registry, mempool, ..
        } = self;
        let evicted = mempool.remove_where(|tx| rules.is_blocked(tx, now, registry));
        if !evicted.is_empty() {
            log_category!(
                Category::Mempool,
                "evicted {} blacklisted transactions",
                evicted.len()
            );
        }
        evicted.len()
    }
}

fn snapshot_of<S: KeyValueStore>(index: &ChainIndex<S>) -> ChainSnapshot {
    let tip = index.tip();
    ChainSnapshot {
        height: tip.height,
        hash: tip.hash,
        time: tip.time,
        mode: tip.mode,
        stake_active: index.is_stake_active(),
    }
}

impl<S: KeyValueStore> Node<S> {
    /// Wraps an index produced by [`hybridd_chainstate::ReindexDriver`].
    pub fn new(
        mut index: ChainIndex<S>,
        registry: SporkRegistry,
        options: NodeOptions,
        clock: Arc<dyn Clock>,
        relay: Arc<dyn Relay>,
    ) -> Self {
        index.checkpoints_mut().sync_sporks(&registry);
        index.refresh(clock.now());
        let snapshot = Arc::new(snapshot_of(&index));
        let rules = index.rules().clone();
        Self {
            core: Mutex::new(NodeCore {
                index,
                registry,
                orphans: OrphanPool::new(options.max_orphan_blocks, options.orphan_expiry_secs),
                mempool: Mempool::new(options.mempool_max_bytes),
            }),
            snapshot: RwLock::new(snapshot),
            rules,
            clock,
            relay,
        }
    }

    fn lock_core(&self) -> MutexGuard<'_, NodeCore<S>> {
        match self.core.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log_warn!("node core lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    fn publish(&self, core: &NodeCore<S>) {
        let next = Arc::new(snapshot_of(&core.index));
        let mut slot = match self.snapshot.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if **slot != *next {
            *slot = next;
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn rules(&self) -> &ConsensusRules {
        &self.rules
    }

    pub fn current_tip(&self) -> Arc<ChainSnapshot> {
        match self.snapshot.read() {
            Ok(snapshot) => Arc::clone(&snapshot),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn is_stake_active(&self) -> bool {
        self.current_tip().stake_active
    }

    pub fn submit_block(&self, block: Block) -> Result<TipChange, RejectReason> {
        self.process_blocks(vec![block])
            .pop()
            .unwrap_or(Ok(TipChange::NoChange))
    }

    /// Admits a batch in order. Proofs are checked in parallel before the
    /// core is locked.
    pub fn process_blocks(&self, blocks: Vec<Block>) -> Vec<Result<TipChange, RejectReason>> {
        if blocks.is_empty() {
            return Vec::new();
        }
        let proofs = self.rules.check_proofs(&blocks);
        let now = self.clock.now();
        let mut accepted = Vec::new();
        let mut results = Vec::with_capacity(blocks.len());
        {
            let mut core = self.lock_core();
            for (block, proof) in blocks.into_iter().zip(proofs) {
                let result = self.admit(&mut core, block, proof.is_ok(), now, &mut accepted);
                results.push(result);
            }
            self.publish(&core);
        }
        for block in &accepted {
            self.relay.broadcast(&NetMessage::Block(block.clone()));
        }
        results
    }

    fn admit(
        &self,
        core: &mut NodeCore<S>,
        block: Block,
        proof_ok: bool,
        now: i64,
        accepted: &mut Vec<Block>,
    ) -> Result<TipChange, RejectReason> {
        if core.index.contains(&block.hash()) {
            return Ok(TipChange::NoChange);
        }
        let previous_height = core.index.tip().height;
        let result = {
            let NodeCore {
                index, registry, ..
            } = &mut *core;
            if proof_ok {
                index.try_accept_prechecked(&block, now, registry)
            } else {
                // Unchecked admission records the failure in the index.
                index.try_accept(&block, now, registry)
            }
        };
        match result {
            Ok(change) => {
                let hash = block.hash();
                log_tip_change(&change, &hash, block.height());
                core.confirm_connected(&change, previous_height, Some(&block));
                accepted.push(block);
                self.connect_pending(core, hash, now, accepted);
                Ok(change)
            }
            Err(RejectReason::MissingParent) if proof_ok => {
                log_category!(
                    Category::Net,
                    "buffering {} until parent {} arrives",
                    hash256_to_hex(&block.hash()),
                    hash256_to_hex(&block.header.prev_block)
                );
                core.orphans.insert(block, now);
                Err(RejectReason::MissingParent)
            }
            Err(RejectReason::MissingParent) => Err(RejectReason::InvalidProof),
            Err(reason) => {
                log_debug!(
                    "rejected block {} at height {}: {reason}",
                    hash256_to_hex(&block.hash()),
                    block.height()
                );
                Err(reason)
            }
        }
    }

    /// Retries buffered descendants of `parent`, oldest first, breadth
    /// first through each generation.
    fn connect_pending(
        &self,
        core: &mut NodeCore<S>,
        parent: Hash256,
        now: i64,
        accepted: &mut Vec<Block>,
    ) {
        let mut queue = VecDeque::from([parent]);
        while let Some(parent) = queue.pop_front() {
            for child in core.orphans.take_children(&parent) {
                let previous_height = core.index.tip().height;
                let NodeCore {
                    index, registry, ..
                } = &mut *core;
                // Only blocks whose proof already passed are buffered.
                match index.try_accept_prechecked(&child, now, registry) {
                    Ok(change) => {
                        let hash = child.hash();
                        log_tip_change(&change, &hash, child.height());
                        core.confirm_connected(&change, previous_height, Some(&child));
                        accepted.push(child);
                        queue.push_back(hash);
                    }
                    Err(reason) => log_debug!(
                        "buffered block {} rejected: {reason}",
                        hash256_to_hex(&child.hash())
                    ),
                }
            }
        }
    }

    /// Applies a spork update, installs any checkpoint it carries, and
    /// relays it. Stale and malformed updates change nothing and are not
    /// relayed.
    pub fn submit_spork(&self, update: SporkUpdate) -> Result<(), SporkError> {
        let now = self.clock.now();
        {
            let mut core = self.lock_core();
            core.registry.apply(update.clone())?;
            match &update.payload {
                SporkPayload::Checkpoint { height, block_hash } => {
                    let previous_height = core.index.tip().height;
                    core.index.checkpoints_mut().add_spork(
                        *height,
                        *block_hash,
                        update.activation_time,
                        update.time_signed,
                    );
                    let change = core.index.refresh(now);
                    if change != TipChange::NoChange {
                        log_info!("checkpoint at height {height} moved the tip: {change:?}");
                    }
                    core.confirm_connected(&change, previous_height, None);
                }
                SporkPayload::Blacklist { .. } => {
                    core.evict_blacklisted(&self.rules, now);
                }
                SporkPayload::Parameter { .. } => {}
            }
            self.publish(&core);
        }
        self.relay.broadcast(&NetMessage::Spork(update));
        Ok(())
    }

    /// Parses an operator `spork` command, applies it, and returns the
    /// update that was issued.
    pub fn submit_spork_command(&self, args: &[&str]) -> Result<SporkUpdate, SporkError> {
        let update = parse_command(args, self.clock.now(), self.rules.params())?;
        self.submit_spork(update.clone())?;
        Ok(update)
    }

    pub fn submit_transaction(&self, tx: Transaction) -> Result<Hash256, MempoolError> {
        if tx.is_coinbase() {
            return Err(MempoolError::new(
                MempoolErrorKind::InvalidTransaction,
                "coinbase outside a block",
            ));
        }
        tx.check()
            .map_err(|reason| MempoolError::new(MempoolErrorKind::InvalidTransaction, reason))?;
        let now = self.clock.now();
        let txid = {
            let mut core = self.lock_core();
            if self.rules.is_blocked(&tx, now, &core.registry) {
                log_category!(
                    Category::Mempool,
                    "refusing {}: spends from a blacklisted script",
                    hash256_to_hex(&tx.txid())
                );
                return Err(MempoolError::new(
                    MempoolErrorKind::Blacklisted,
                    RejectReason::Blacklisted.as_str(),
                ));
            }
            core.mempool.insert(tx.clone(), now)?
        };
        self.relay.broadcast(&NetMessage::Transaction(tx));
        Ok(txid)
    }

    pub fn is_address_blacklisted(&self, address: &str) -> Result<bool, AddressError> {
        let script = address_to_script_pubkey(address, self.rules.params())?;
        let now = self.clock.now();
        Ok(self.lock_core().registry.is_blacklisted(&script, now))
    }

    pub fn get_checkpoints(&self) -> Vec<CheckpointEntry> {
        let now = self.clock.now();
        self.lock_core().index.checkpoints().list(now)
    }

    /// Switches checkpoint enforcement and re-runs tip selection.
    pub fn set_checkpoint_enforcement(&self, enforce: bool) -> TipChange {
        let now = self.clock.now();
        let mut core = self.lock_core();
        let previous_height = core.index.tip().height;
        core.index.checkpoints_mut().set_enforced(enforce);
        let change = core.index.refresh(now);
        core.confirm_connected(&change, previous_height, None);
        self.publish(&core);
        change
    }

    pub fn chain_tips(&self) -> Vec<TipInfo> {
        let now = self.clock.now();
        self.lock_core().index.chain_tips(now)
    }

    pub fn block_info(&self, hash: &Hash256) -> Option<BlockInfo> {
        self.lock_core().index.block_by_hash(hash)
    }

    pub fn hash_at_height(&self, height: i64) -> Option<Hash256> {
        self.lock_core().index.hash_at_height(height)
    }

    pub fn pending_blocks(&self) -> usize {
        self.lock_core().orphans.len()
    }

    pub fn mempool_size(&self) -> usize {
        self.lock_core().mempool.size()
    }

    /// Messages to hand a newly connected peer.
    pub fn sync_messages(&self) -> Vec<SporkUpdate> {
        let now = self.clock.now();
        self.lock_core().registry.sync_messages(now)
    }

    pub fn spork_show(&self) -> Vec<SporkInfo> {
        let now = self.clock.now();
        self.lock_core()
            .registry
            .show(now)
            .into_iter()
            .map(|(name, latest, active)| SporkInfo {
                name,
                latest,
                active,
            })
            .collect()
    }

    /// Expires pending blocks, forgets sporks too old to relay, evicts
    /// transactions whose blacklist entry has come into force, and re-runs
    /// tip selection as checkpoint activations come due.
    ///
    /// Pruning only affects relay: checkpoint pins already installed stay
    /// enforced.
    pub fn tick(&self) -> MaintenanceReport {
        let now = self.clock.now();
        let mut core = self.lock_core();
        let before = core.index.tip();
        let expired_blocks = core.orphans.expire(now);
        let pruned_sporks = core.registry.prune_expired(now).len();
        let evicted_transactions = core.evict_blacklisted(&self.rules, now);
        let change = core.index.refresh(now);
        if change != TipChange::NoChange {
            log_info!("maintenance moved the tip: {change:?}");
        }
        core.confirm_connected(&change, before.height, None);
        let tip_changed = core.index.tip().hash != before.hash;
        let next_checkpoint_activation = core.index.checkpoints().next_activation(now);
        self.publish(&core);
        if expired_blocks > 0 || pruned_sporks > 0 {
            log_debug!("maintenance: {expired_blocks} pending blocks expired, {pruned_sporks} sporks pruned");
        }
        MaintenanceReport {
            expired_blocks,
            pruned_sporks,
            evicted_transactions,
            tip_changed,
            next_checkpoint_activation,
        }
    }

    /// Builds `count` blocks on the active tip through `producer` and
    /// admits each one. `time_hint` fixes the timestamp; otherwise the node
    /// clock is used. Timestamps are raised past the median time past.
    pub fn generate(
        &self,
        producer: &mut dyn BlockProducer,
        count: usize,
        time_hint: Option<i64>,
    ) -> Result<Vec<Hash256>, String> {
        let mut hashes = Vec::with_capacity(count);
        for _ in 0..count {
            let template = self.template(time_hint)?;
            let block = producer.produce(&template, &self.rules)?;
            let hash = block.hash();
            match self.submit_block(block) {
                Ok(_) => hashes.push(hash),
                Err(reason) => {
                    return Err(format!(
                        "generated block at height {} rejected: {reason}",
                        template.height
                    ))
                }
            }
        }
        Ok(hashes)
    }

    fn template(&self, time_hint: Option<i64>) -> Result<BlockTemplate, String> {
        let core = self.lock_core();
        let tip = core.index.tip();
        let mtp = core
            .index
            .median_time_past(&tip.hash)
            .ok_or_else(|| "tip missing from index".to_string())?;
        let time = time_hint.unwrap_or_else(|| self.clock.now()).max(mtp + 1);
        // Blocks are checked against the blacklist at their own time.
        let transactions = core
            .mempool
            .transactions()
            .into_iter()
            .filter(|tx| !self.rules.is_blocked(tx, time, &core.registry))
            .collect();
        Ok(BlockTemplate {
            parent: tip.hash,
            height: tip.height + 1,
            mode: core.index.next_mode(time, &core.registry),
            time,
            transactions,
        })
    }

    pub fn chain_info(&self) -> ChainInfo {
        let now = self.clock.now();
        let core = self.lock_core();
        let tip = core.index.tip();
        let first_pos = core.registry.first_pos_height(now);
        ChainInfo {
            chain: self.rules.params().network.as_str(),
            blocks: tip.height,
            bestblockhash: hash256_to_hex(&tip.hash),
            mediantime: core.index.median_time_past(&tip.hash).unwrap_or(tip.time),
            chainwork: format!("{:x}", tip.chainwork),
            mode: tip.mode.as_str(),
            stake_active: core.index.is_stake_active(),
            first_pos_height: (first_pos != FIRST_POS_DISABLED).then_some(first_pos),
            checkpoints_enforced: core.index.checkpoints().is_enforced(),
            checkpoints: core
                .index
                .checkpoints()
                .list(now)
                .iter()
                .map(CheckpointInfo::from)
                .collect(),
            pending_blocks: core.orphans.len(),
            mempool_size: core.mempool.size(),
            sporks: core
                .registry
                .show(now)
                .into_iter()
                .map(|(name, latest, active)| SporkInfo {
                    name,
                    latest,
                    active,
                })
                .collect(),
        }
    }
}

fn log_tip_change(change: &TipChange, hash: &Hash256, height: i64) {
    match change {
        TipChange::Extended => {
            log_debug!("new tip {} at height {height}", hash256_to_hex(hash))
        }
        TipChange::ReorgTo(tip, fork_height) => log_info!(
            "reorganized to {} (fork at height {fork_height}) after {}",
            hash256_to_hex(tip),
            hash256_to_hex(hash)
        ),
        TipChange::NoChange => {}
    }
}
