use hybridd_consensus::constants::POS_VERSION_BIT;
use hybridd_consensus::{consensus_params, Hash256, Network};
use hybridd_primitives::block::{Block, BlockHeader, BlockMode, StakeProof};
use hybridd_primitives::encoding::encode;
use hybridd_primitives::genesis_block;
use hybridd_primitives::outpoint::OutPoint;
use hybridd_primitives::transaction::{Transaction, TxIn, TxOut};

fn seq_hash(start: u8) -> Hash256 {
    std::array::from_fn(|i| start.wrapping_add(i as u8))
}

fn work_header() -> BlockHeader {
    BlockHeader {
        version: 4,
        prev_block: seq_hash(0x10),
        merkle_root: seq_hash(0x40),
        height: 0x0102_0304,
        time: 0x5566_7788,
        bits: 0x1d00_ffff,
        nonce: 0xdead_beef,
        stake: None,
    }
}

#[test]
fn work_header_layout() {
    let bytes = encode(&work_header());
    assert_eq!(bytes.len(), 4 + 32 + 32 + 4 * 4);
    assert_eq!(&bytes[0..4], &4i32.to_le_bytes());
    assert_eq!(&bytes[4..36], &seq_hash(0x10));
    assert_eq!(&bytes[36..68], &seq_hash(0x40));
    assert_eq!(&bytes[68..72], &[0x04, 0x03, 0x02, 0x01]);
    assert_eq!(&bytes[72..76], &0x5566_7788u32.to_le_bytes());
    assert_eq!(&bytes[76..80], &0x1d00_ffffu32.to_le_bytes());
    assert_eq!(&bytes[80..84], &0xdead_beefu32.to_le_bytes());
}

#[test]
fn stake_header_appends_proof() {
    let mut header = work_header();
    header.version |= POS_VERSION_BIT;
    header.stake = Some(StakeProof {
        prevout: OutPoint {
            hash: seq_hash(0x80),
            index: 2,
        },
        value: 250,
        time_from: 1_000,
        script_pubkey: vec![0x51, 0x52],
    });
    let bytes = encode(&header);
    let tail = &bytes[84..];
    assert_eq!(&tail[0..32], &seq_hash(0x80));
    assert_eq!(&tail[32..36], &2u32.to_le_bytes());
    assert_eq!(&tail[36..44], &250i64.to_le_bytes());
    assert_eq!(&tail[44..48], &1_000u32.to_le_bytes());
    assert_eq!(&tail[48..], &[0x02, 0x51, 0x52]);
    assert_eq!(header.mode(), BlockMode::ProofOfStake);
}

#[test]
fn block_id_covers_header_only() {
    let tx = Transaction {
        version: 1,
        vin: vec![TxIn::spending(
            OutPoint {
                hash: seq_hash(1),
                index: 0,
            },
            vec![0x51],
        )],
        vout: vec![TxOut {
            value: 10,
            script_pubkey: vec![0x52],
        }],
        lock_time: 0,
    };
    let mut block = Block {
        header: work_header(),
        transactions: vec![tx.clone()],
    };
    let id = block.hash();
    block.transactions.push(tx);
    assert_eq!(block.hash(), id);
    assert_ne!(block.compute_merkle_root(), block.header.merkle_root);
}

#[test]
fn genesis_commits_to_its_coinbase() {
    for network in [Network::Mainnet, Network::Testnet, Network::Regtest] {
        let params = consensus_params(network);
        let genesis = genesis_block(&params);
        assert_eq!(genesis.height(), 0);
        assert_eq!(genesis.mode(), BlockMode::ProofOfWork);
        assert_eq!(genesis.header.merkle_root, genesis.compute_merkle_root());
        assert!(genesis.transactions[0].is_coinbase());
        assert_eq!(genesis.time(), i64::from(params.genesis_time));
    }
}
