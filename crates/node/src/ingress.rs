//! Inbound message handling and outbound relay.
//!
//! Peers push raw `(command, payload)` frames into one channel; a single
//! worker thread decodes them and feeds the node. Consecutive blocks are
//! batched so their proofs can be checked in parallel.

use std::fmt;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use hybridd_log::{log_category, log_debug, Category};
use hybridd_primitives::block::Block;
use hybridd_primitives::encoding::{decode, encode, DecodeError};
use hybridd_primitives::transaction::Transaction;
use hybridd_spork::SporkUpdate;
use hybridd_storage::KeyValueStore;

use crate::node::Node;

pub const CMD_BLOCK: &str = "block";
pub const CMD_SPORK: &str = "spork";
pub const CMD_TX: &str = "tx";

const MAX_BLOCK_BATCH: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetMessage {
    Block(Block),
    Spork(SporkUpdate),
    Transaction(Transaction),
}

#[derive(Debug)]
pub enum MessageError {
    UnknownCommand(String),
    Decode(DecodeError),
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::UnknownCommand(command) => write!(f, "unknown command '{command}'"),
            MessageError::Decode(err) => write!(f, "undecodable payload: {err}"),
        }
    }
}

impl std::error::Error for MessageError {}

impl From<DecodeError> for MessageError {
    fn from(err: DecodeError) -> Self {
        MessageError::Decode(err)
    }
}

impl NetMessage {
    pub fn command(&self) -> &'static str {
        match self {
            NetMessage::Block(_) => CMD_BLOCK,
            NetMessage::Spork(_) => CMD_SPORK,
            NetMessage::Transaction(_) => CMD_TX,
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        match self {
            NetMessage::Block(block) => block.to_bytes(),
            NetMessage::Spork(update) => update.to_bytes(),
            NetMessage::Transaction(tx) => encode(tx),
        }
    }

    pub fn decode(command: &str, payload: &[u8]) -> Result<Self, MessageError> {
        match command {
            CMD_BLOCK => Ok(NetMessage::Block(Block::from_bytes(payload)?)),
            CMD_SPORK => Ok(NetMessage::Spork(SporkUpdate::from_bytes(payload)?)),
            CMD_TX => Ok(NetMessage::Transaction(decode(payload)?)),
            other => Err(MessageError::UnknownCommand(other.to_string())),
        }
    }
}

/// The network side: whatever fans messages out to connected peers.
pub trait Relay: Send + Sync {
    fn broadcast(&self, message: &NetMessage);
}

/// Relay for nodes with no peers.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRelay;

impl Relay for NullRelay {
    fn broadcast(&self, _message: &NetMessage) {}
}

#[derive(Clone, Debug)]
pub struct RawMessage {
    pub peer: u64,
    pub command: String,
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn from_message(peer: u64, message: &NetMessage) -> Self {
        Self {
            peer,
            command: message.command().to_string(),
            payload: message.payload(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngressStats {
    pub blocks_accepted: u64,
    pub blocks_rejected: u64,
    pub sporks_applied: u64,
    pub sporks_rejected: u64,
    pub transactions_accepted: u64,
    pub transactions_rejected: u64,
    pub malformed: u64,
}

/// Running ingress worker. Dropping every sender (including the one held
/// here, via [`Ingress::shutdown`]) stops it.
pub struct Ingress {
    sender: Sender<RawMessage>,
    handle: thread::JoinHandle<IngressStats>,
}

impl Ingress {
    pub fn spawn<S>(node: Arc<Node<S>>) -> Result<Self, String>
    where
        S: KeyValueStore + 'static,
    {
        let (sender, receiver) = unbounded::<RawMessage>();
        let handle = thread::Builder::new()
            .name("ingress".to_string())
            .spawn(move || run_worker(&node, &receiver))
            .map_err(|err| format!("failed to spawn ingress worker: {err}"))?;
        Ok(Self { sender, handle })
    }

    pub fn sender(&self) -> Sender<RawMessage> {
        self.sender.clone()
    }

    /// Closes the channel and waits for queued messages to drain.
    pub fn shutdown(self) -> IngressStats {
        drop(self.sender);
        self.handle.join().unwrap_or_default()
    }
}

fn run_worker<S: KeyValueStore>(node: &Node<S>, receiver: &Receiver<RawMessage>) -> IngressStats {
    let mut stats = IngressStats::default();
    let mut blocks: Vec<Block> = Vec::new();
    while let Ok(first) = receiver.recv() {
        let mut pending = vec![first];
        while pending.len() < MAX_BLOCK_BATCH {
            match receiver.try_recv() {
                Ok(next) => pending.push(next),
                Err(_) => break,
            }
        }
        for raw in pending {
            let message = match NetMessage::decode(&raw.command, &raw.payload) {
                Ok(message) => message,
                Err(err) => {
                    stats.malformed += 1;
                    log_category!(Category::Net, "peer {} sent {}: {err}", raw.peer, raw.command);
                    continue;
                }
            };
            match message {
                NetMessage::Block(block) => blocks.push(block),
                other => {
                    flush_blocks(node, &mut blocks, &mut stats);
                    handle_message(node, raw.peer, other, &mut stats);
                }
            }
        }
        flush_blocks(node, &mut blocks, &mut stats);
    }
    log_debug!("ingress worker stopped: {stats:?}");
    stats
}

fn flush_blocks<S: KeyValueStore>(node: &Node<S>, blocks: &mut Vec<Block>, stats: &mut IngressStats) {
    if blocks.is_empty() {
        return;
    }
    for result in node.process_blocks(std::mem::take(blocks)) {
        match result {
            Ok(_) => stats.blocks_accepted += 1,
            Err(_) => stats.blocks_rejected += 1,
        }
    }
}

fn handle_message<S: KeyValueStore>(
    node: &Node<S>,
    peer: u64,
    message: NetMessage,
    stats: &mut IngressStats,
) {
    match message {
        NetMessage::Spork(update) => match node.submit_spork(update) {
            Ok(()) => stats.sporks_applied += 1,
            Err(err) => {
                stats.sporks_rejected += 1;
                log_category!(Category::Spork, "peer {peer}: {err}");
            }
        },
        NetMessage::Transaction(tx) => match node.submit_transaction(tx) {
            Ok(_) => stats.transactions_accepted += 1,
            Err(err) => {
                stats.transactions_rejected += 1;
                log_category!(Category::Mempool, "peer {peer}: {err}");
            }
        },
        NetMessage::Block(block) => {
            let mut batch = vec![block];
            flush_blocks(node, &mut batch, stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridd_consensus::{consensus_params, Network};
    use hybridd_primitives::genesis_block;

    #[test]
    fn frames_decode_by_command() {
        let block = genesis_block(&consensus_params(Network::Regtest));
        let message = NetMessage::Block(block);
        let raw = RawMessage::from_message(3, &message);
        assert_eq!(raw.command, CMD_BLOCK);
        assert_eq!(
            NetMessage::decode(&raw.command, &raw.payload).expect("decode"),
            message
        );
        assert!(matches!(
            NetMessage::decode("inv", &[]),
            Err(MessageError::UnknownCommand(_))
        ));
        assert!(matches!(
            NetMessage::decode(CMD_SPORK, &[1, 2]),
            Err(MessageError::Decode(_))
        ));
    }
}
