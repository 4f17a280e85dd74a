#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use hybridd::clock::MockClock;
use hybridd::config::{Backend, Config};
use hybridd::ingress::{NetMessage, Relay};
use hybridd::node::Node;
use hybridd::producer::RegtestProducer;
use hybridd::build_node;
use hybridd_consensus::{consensus_params, Hash256, Network};
use hybridd_primitives::block::Block;
use hybridd_primitives::outpoint::OutPoint;
use hybridd_primitives::transaction::{Transaction, TxIn, TxOut};
use hybridd_spork::SporkUpdate;
use hybridd_storage::memory::MemoryStore;

pub const BLOCK_SPACING: i64 = 60;

/// Keeps everything a node broadcasts so tests can deliver it elsewhere.
#[derive(Default)]
pub struct RecordingRelay {
    sent: Mutex<Vec<NetMessage>>,
}

impl RecordingRelay {
    pub fn take(&self) -> Vec<NetMessage> {
        std::mem::take(&mut *self.sent.lock().expect("relay lock"))
    }

    pub fn take_blocks(&self) -> Vec<Block> {
        self.take()
            .into_iter()
            .filter_map(|message| match message {
                NetMessage::Block(block) => Some(block),
                _ => None,
            })
            .collect()
    }

    pub fn take_sporks(&self) -> Vec<SporkUpdate> {
        self.take()
            .into_iter()
            .filter_map(|message| match message {
                NetMessage::Spork(update) => Some(update),
                _ => None,
            })
            .collect()
    }
}

impl Relay for RecordingRelay {
    fn broadcast(&self, message: &NetMessage) {
        self.sent.lock().expect("relay lock").push(message.clone());
    }
}

pub fn genesis_time() -> i64 {
    i64::from(consensus_params(Network::Regtest).genesis_time)
}

pub fn regtest_config() -> Config {
    Config {
        network: Network::Regtest,
        backend: Backend::Memory,
        ..Config::default()
    }
}

pub struct TestNode {
    pub node: Arc<Node<MemoryStore>>,
    pub relay: Arc<RecordingRelay>,
    pub producer: RegtestProducer,
}

impl TestNode {
    /// Blocks from different nodes differ through `tag` in the payout.
    pub fn new(clock: &MockClock, tag: u8) -> Self {
        let relay = Arc::new(RecordingRelay::default());
        let node = build_node(
            &regtest_config(),
            Arc::new(MemoryStore::new()),
            Arc::new(clock.clone()),
            relay.clone(),
        )
        .expect("node builds");
        Self {
            node: Arc::new(node),
            relay,
            producer: RegtestProducer::new(p2pkh(tag)),
        }
    }

    /// Mines `count` blocks one spacing apart on the shared clock.
    pub fn mine(&mut self, clock: &MockClock, count: usize) -> Vec<Hash256> {
        let mut hashes = Vec::with_capacity(count);
        for _ in 0..count {
            clock.advance(BLOCK_SPACING);
            hashes.extend(
                self.node
                    .generate(&mut self.producer, 1, None)
                    .expect("block generated"),
            );
        }
        hashes
    }
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
            value: 1_000,
            script_pubkey: p2pkh(0xee),
        }],
        lock_time: 0,
    }
}
