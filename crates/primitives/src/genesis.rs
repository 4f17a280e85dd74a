//! Genesis block construction from network parameters.

use hybridd_consensus::constants::BASE_BLOCK_VERSION;
use hybridd_consensus::money::COIN;
use hybridd_consensus::ConsensusParams;

use crate::block::{Block, BlockHeader};
use crate::transaction::Transaction;

// OP_RETURN: the genesis output is unspendable.
const GENESIS_OUTPUT_SCRIPT: [u8; 1] = [0x6a];

/// Builds the network's genesis block. It is trusted by construction and
/// never passes through proof checks.
pub fn genesis_block(params: &ConsensusParams) -> Block {
    let coinbase = Transaction::coinbase(0, 50 * COIN, GENESIS_OUTPUT_SCRIPT.to_vec());
    let mut block = Block {
        header: BlockHeader {
            version: BASE_BLOCK_VERSION,
            prev_block: [0u8; 32],
            merkle_root: [0u8; 32],
            height: 0,
            time: params.genesis_time,
            bits: params.genesis_bits,
            nonce: params.genesis_nonce,
            stake: None,
        },
        transactions: vec![coinbase],
    };
    block.header.merkle_root = block.compute_merkle_root();
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridd_consensus::{consensus_params, Network};

    #[test]
    fn genesis_differs_per_network() {
        let main = genesis_block(&consensus_params(Network::Mainnet));
        let reg = genesis_block(&consensus_params(Network::Regtest));
        assert_ne!(main.hash(), reg.hash());
        assert_eq!(reg.height(), 0);
        assert_eq!(reg.header.merkle_root, reg.compute_merkle_root());
    }
}
