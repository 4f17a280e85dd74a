use hybridd_consensus::constants::{BASE_BLOCK_VERSION, POS_VERSION_BIT};
use hybridd_consensus::money::COIN;
use hybridd_consensus::{consensus_params, Network};
use hybridd_pos::{validate_pos_header, PosError};
use hybridd_pow::Sha256dOracle;
use hybridd_primitives::block::{BlockHeader, StakeProof};
use hybridd_primitives::outpoint::OutPoint;

fn stake_header(value: i64, time_from: u32, time: u32, bits: u32) -> BlockHeader {
    BlockHeader {
        version: BASE_BLOCK_VERSION | POS_VERSION_BIT,
        prev_block: [5u8; 32],
        merkle_root: [6u8; 32],
        height: 103,
        time,
        bits,
        nonce: 0,
        stake: Some(StakeProof {
            prevout: OutPoint {
                hash: [8u8; 32],
                index: 0,
            },
            value,
            time_from,
            script_pubkey: vec![0x51],
        }),
    }
}

#[test]
fn large_stake_on_regtest_always_wins() {
    let params = consensus_params(Network::Regtest);
    let header = stake_header(100 * COIN, 1_000, 2_000, 0x200f_ffff);
    assert_eq!(validate_pos_header(&header, &params, &Sha256dOracle), Ok(()));
}

#[test]
fn dust_stake_is_rejected() {
    let params = consensus_params(Network::Regtest);
    let header = stake_header(COIN - 1, 1_000, 2_000, 0x200f_ffff);
    assert_eq!(
        validate_pos_header(&header, &params, &Sha256dOracle),
        Err(PosError::StakeTooSmall)
    );
}

#[test]
fn young_stake_is_rejected_where_age_applies() {
    let params = consensus_params(Network::Testnet);
    let header = stake_header(100 * COIN, 1_000, 1_100, 0x1e00_ffff);
    assert_eq!(
        validate_pos_header(&header, &params, &Sha256dOracle),
        Err(PosError::StakeTooYoung)
    );
}

#[test]
fn work_header_is_not_a_stake_header() {
    let params = consensus_params(Network::Regtest);
    let mut header = stake_header(100 * COIN, 1_000, 2_000, 0x200f_ffff);
    header.version = BASE_BLOCK_VERSION;
    header.stake = None;
    assert_eq!(
        validate_pos_header(&header, &params, &Sha256dOracle),
        Err(PosError::InvalidHeader("pos validation on work header"))
    );
}

#[test]
fn target_above_pos_limit_is_rejected() {
    let params = consensus_params(Network::Regtest);
    let header = stake_header(100 * COIN, 1_000, 2_000, 0x207f_ffff);
    assert_eq!(
        validate_pos_header(&header, &params, &Sha256dOracle),
        Err(PosError::InvalidHeader("pos target above limit"))
    );
}

#[test]
fn tiny_target_misses() {
    let params = consensus_params(Network::Regtest);
    // One-unit target per coin: no digest will land below it.
    let header = stake_header(COIN, 1_000, 2_000, 0x0300_0001);
    assert_eq!(
        validate_pos_header(&header, &params, &Sha256dOracle),
        Err(PosError::KernelMissesTarget)
    );
}
