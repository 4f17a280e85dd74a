#![allow(dead_code)]

use std::sync::Arc;

use hybridd_chainstate::{ChainIndex, CheckpointTable, ConsensusRules};
use hybridd_consensus::constants::{BASE_BLOCK_VERSION, FIRST_POS_DISABLED, POS_VERSION_BIT};
use hybridd_consensus::money::COIN;
use hybridd_consensus::{consensus_params, Hash256, Network};
use hybridd_pow::{validate_pow_header, Sha256dOracle};
use hybridd_primitives::block::{Block, BlockHeader, BlockMode, StakeProof};
use hybridd_primitives::outpoint::OutPoint;
use hybridd_primitives::transaction::{Transaction, TxIn, TxOut};
use hybridd_spork::{SporkPayload, SporkRegistry, SporkUpdate, SPORK_15_FIRST_POS_BLOCK};
use hybridd_storage::KeyValueStore;

pub const WORK_BITS: u32 = 0x207f_ffff;
pub const STAKE_BITS: u32 = 0x200f_ffff;
pub const BLOCK_SPACING: i64 = 60;

pub fn params() -> hybridd_consensus::ConsensusParams {
    consensus_params(Network::Regtest)
}

pub fn genesis_time() -> i64 {
    i64::from(params().genesis_time)
}

/// Local time comfortably after every test block.
pub fn late_now() -> i64 {
    genesis_time() + 1_000_000
}

pub fn rules() -> ConsensusRules {
    ConsensusRules::new(params(), Arc::new(Sha256dOracle))
}

pub fn new_index<S: KeyValueStore>(store: Arc<S>, checkpoints: CheckpointTable) -> ChainIndex<S> {
    ChainIndex::new(store, rules(), checkpoints)
}

pub fn registry() -> SporkRegistry {
    SporkRegistry::new(FIRST_POS_DISABLED)
}

pub fn p2pkh(tag: u8) -> Vec<u8> {
    let mut script = vec![0x76, 0xa9, 0x14];
    script.extend_from_slice(&[tag; 20]);
    script.extend_from_slice(&[0x88, 0xac]);
    script
}

pub fn spend_from(script: Vec<u8>, tag: u8) -> Transaction {
    Transaction {
        version: 1,
        vin: vec![TxIn::spending(
            OutPoint {
                hash: [tag; 32],
                index: 0,
            },
            script,
        )],
        vout: vec![TxOut {
            value: COIN,
            script_pubkey: p2pkh(0xee),
        }],
        lock_time: 0,
    }
}

pub fn first_pos_spork(height: i64, signed: i64) -> SporkUpdate {
    SporkUpdate::new(
        SporkPayload::Parameter {
            id: SPORK_15_FIRST_POS_BLOCK,
            value: height,
        },
        signed,
    )
}

/// Builds a valid block of `mode` on `parent`. `tag` separates siblings.
pub fn make_block(
    parent: Hash256,
    height: u32,
    time: i64,
    mode: BlockMode,
    tag: u8,
    extra: Vec<Transaction>,
) -> Block {
    let mut transactions = vec![Transaction::coinbase(height, 50 * COIN, vec![0x51, tag])];
    transactions.extend(extra);
    let (version, bits, stake) = match mode {
        BlockMode::ProofOfWork => (BASE_BLOCK_VERSION, WORK_BITS, None),
        BlockMode::ProofOfStake => (
            BASE_BLOCK_VERSION | POS_VERSION_BIT,
            STAKE_BITS,
            Some(StakeProof {
                prevout: OutPoint {
                    hash: [tag.wrapping_add(1); 32],
                    index: height,
                },
                value: 100 * COIN,
                time_from: (time - 1) as u32,
                script_pubkey: p2pkh(tag),
            }),
        ),
    };
    let mut block = Block {
        header: BlockHeader {
            version,
            prev_block: parent,
            merkle_root: [0u8; 32],
            height,
            time: time as u32,
            bits,
            nonce: 0,
            stake,
        },
        transactions,
    };
    block.header.merkle_root = block.compute_merkle_root();
    if mode == BlockMode::ProofOfWork {
        let params = params();
        while validate_pow_header(&block.header, &params, &Sha256dOracle).is_err() {
            block.header.nonce += 1;
        }
    }
    block
}

/// Builds and accepts `count` blocks on `from`, each in the mode the index
/// requires. Returns them in order.
pub fn extend<S: KeyValueStore>(
    index: &mut ChainIndex<S>,
    registry: &SporkRegistry,
    now: i64,
    from: Hash256,
    count: usize,
    tag: u8,
) -> Vec<Block> {
    let mut parent = index.block_by_hash(&from).expect("parent indexed");
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let height = parent.height + 1;
        let time = genesis_time() + height * BLOCK_SPACING + i64::from(tag);
        let mode = index
            .rules()
            .required_mode(parent.mode, height, time, registry);
        let block = make_block(parent.hash, height as u32, time, mode, tag, Vec::new());
        index
            .try_accept(&block, now, registry)
            .expect("block accepted");
        parent = index.block_by_hash(&block.hash()).expect("indexed");
        out.push(block);
    }
    out
}
