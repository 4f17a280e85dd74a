//! Persisted block records.
//!
//! `block_index` holds the small per-block record, including the mode tag
//! decided at first acceptance; `block_data` holds the full block encoding.

use std::sync::Arc;

use hybridd_consensus::Hash256;
use hybridd_primitives::block::{Block, BlockMode};
use hybridd_primitives::encoding::{Decoder, Encoder};
use hybridd_storage::{Column, KeyValueStore, StoreError, WriteBatch};

const BLOCK_RECORD_LEN: usize = 8 + 32 + 1 + 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRecord {
    pub height: i64,
    pub parent: Hash256,
    pub mode: BlockMode,
    /// First-seen sequence; breaks ties between equal-work tips.
    pub arrival: u64,
}

impl BlockRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_i64_le(self.height);
        encoder.write_hash(&self.parent);
        encoder.write_u8(self.mode.tag());
        encoder.write_u64_le(self.arrival);
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() != BLOCK_RECORD_LEN {
            return Err(format!("block record has {} bytes", bytes.len()));
        }
        let mut decoder = Decoder::new(bytes);
        let height = decoder.read_i64_le().map_err(|err| err.to_string())?;
        let parent = decoder.read_hash().map_err(|err| err.to_string())?;
        let tag = decoder.read_u8().map_err(|err| err.to_string())?;
        let mode = BlockMode::from_tag(tag).ok_or_else(|| format!("unknown mode tag {tag}"))?;
        let arrival = decoder.read_u64_le().map_err(|err| err.to_string())?;
        Ok(Self {
            height,
            parent,
            mode,
            arrival,
        })
    }
}

pub struct BlockStore<S> {
    store: Arc<S>,
}

impl<S> Clone for BlockStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KeyValueStore> BlockStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn put_block(
        &self,
        batch: &mut WriteBatch,
        hash: &Hash256,
        record: &BlockRecord,
        block: &Block,
    ) {
        batch.put(Column::BlockIndex, hash, record.encode());
        batch.put(Column::BlockData, hash, block.to_bytes());
    }

    pub fn commit(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        self.store.write_batch(batch)
    }

    pub fn record(&self, hash: &Hash256) -> Result<Option<BlockRecord>, StoreError> {
        match self.store.get(Column::BlockIndex, hash)? {
            Some(bytes) => BlockRecord::decode(&bytes)
                .map(Some)
                .map_err(StoreError::Backend),
            None => Ok(None),
        }
    }

    pub fn block_bytes(&self, hash: &Hash256) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.get(Column::BlockData, hash)
    }

    pub fn block(&self, hash: &Hash256) -> Result<Option<Block>, StoreError> {
        match self.block_bytes(hash)? {
            Some(bytes) => Block::from_bytes(&bytes)
                .map(Some)
                .map_err(|err| StoreError::Backend(format!("block data: {err}"))),
            None => Ok(None),
        }
    }

    /// Every record, keyed by block id. Undecodable records are returned as
    /// errors so the caller can decide whether that is fatal.
    pub fn records(&self) -> Result<Vec<(Hash256, Result<BlockRecord, String>)>, StoreError> {
        let mut out = Vec::new();
        self.store
            .for_each_prefix(Column::BlockIndex, &[], &mut |key, value| {
                let hash: Hash256 = key
                    .try_into()
                    .map_err(|_| StoreError::Backend(format!("block index key has {} bytes", key.len())))?;
                out.push((hash, BlockRecord::decode(value)));
                Ok(())
            })?;
        Ok(out)
    }
}
