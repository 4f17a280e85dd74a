//! Blocks waiting for their parent.

use std::collections::HashMap;

use hybridd_consensus::constants::{DEFAULT_MAX_ORPHAN_BLOCKS, DEFAULT_ORPHAN_EXPIRY_SECS};
use hybridd_consensus::Hash256;
use hybridd_primitives::block::Block;

#[derive(Clone, Debug)]
struct OrphanBlock {
    block: Block,
    parent: Hash256,
    received: i64,
    /// Insertion order; eviction and retry are oldest first.
    seq: u64,
}

#[derive(Debug)]
pub struct OrphanPool {
    orphans: HashMap<Hash256, OrphanBlock>,
    by_parent: HashMap<Hash256, Vec<Hash256>>,
    capacity: usize,
    expiry_secs: i64,
    next_seq: u64,
}

impl Default for OrphanPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ORPHAN_BLOCKS, DEFAULT_ORPHAN_EXPIRY_SECS)
    }
}

impl OrphanPool {
    pub fn new(capacity: usize, expiry_secs: i64) -> Self {
        Self {
            orphans: HashMap::new(),
            by_parent: HashMap::new(),
            capacity,
            expiry_secs,
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.orphans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty()
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.orphans.contains_key(hash)
    }

    /// Buffers `block`. Returns false if it was already held or the pool is
    /// disabled.
    pub fn insert(&mut self, block: Block, now: i64) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let hash = block.hash();
        if self.orphans.contains_key(&hash) {
            return false;
        }
        self.expire(now);
        while self.orphans.len() >= self.capacity {
            if !self.evict_oldest() {
                break;
            }
        }

        let parent = block.header.prev_block;
        self.by_parent.entry(parent).or_default().push(hash);
        self.orphans.insert(
            hash,
            OrphanBlock {
                block,
                parent,
                received: now,
                seq: self.next_seq,
            },
        );
        self.next_seq += 1;
        true
    }

    /// Removes and returns the buffered children of `parent`, oldest first.
    pub fn take_children(&mut self, parent: &Hash256) -> Vec<Block> {
        let Some(hashes) = self.by_parent.remove(parent) else {
            return Vec::new();
        };
        let mut children: Vec<OrphanBlock> = hashes
            .iter()
            .filter_map(|hash| self.orphans.remove(hash))
            .collect();
        children.sort_by_key(|orphan| orphan.seq);
        children.into_iter().map(|orphan| orphan.block).collect()
    }

    /// Drops entries older than the expiry window. Returns how many went.
    pub fn expire(&mut self, now: i64) -> usize {
        if self.expiry_secs <= 0 {
            return 0;
        }
        let cutoff = now.saturating_sub(self.expiry_secs);
        let stale: Vec<Hash256> = self
            .orphans
            .iter()
            .filter(|(_, orphan)| orphan.received <= cutoff)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in &stale {
            self.remove(hash);
        }
        stale.len()
    }

    fn evict_oldest(&mut self) -> bool {
        let Some(oldest) = self
            .orphans
            .iter()
            .min_by_key(|(_, orphan)| orphan.seq)
            .map(|(hash, _)| *hash)
        else {
            return false;
        };
        self.remove(&oldest);
        true
    }

    fn remove(&mut self, hash: &Hash256) -> Option<Block> {
        let orphan = self.orphans.remove(hash)?;
        if let Some(children) = self.by_parent.get_mut(&orphan.parent) {
            children.retain(|child| child != hash);
            if children.is_empty() {
                self.by_parent.remove(&orphan.parent);
            }
        }
        Some(orphan.block)
    }
}
