use hybridd_consensus::constants::POS_VERSION_BIT;
use hybridd_consensus::Hash256;
use hybridd_primitives::block::{Block, BlockHeader, StakeProof};
use hybridd_primitives::encoding::{decode, encode, DecodeError};
use hybridd_primitives::outpoint::OutPoint;
use hybridd_primitives::transaction::{Transaction, TxIn, TxOut};

struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        self.state
    }

    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u8(&mut self) -> u8 {
        (self.next_u64() >> 56) as u8
    }

    fn gen_range(&mut self, max: usize) -> usize {
        if max == 0 {
            0
        } else {
            (self.next_u64() % max as u64) as usize
        }
    }
}

fn random_hash(rng: &mut Lcg) -> Hash256 {
    std::array::from_fn(|_| rng.next_u8())
}

fn random_vec(rng: &mut Lcg, max_len: usize) -> Vec<u8> {
    let len = rng.gen_range(max_len + 1);
    (0..len).map(|_| rng.next_u8()).collect()
}

fn random_outpoint(rng: &mut Lcg) -> OutPoint {
    OutPoint {
        hash: random_hash(rng),
        index: rng.next_u32(),
    }
}

fn random_tx(rng: &mut Lcg) -> Transaction {
    let vin = (0..1 + rng.gen_range(3))
        .map(|_| TxIn {
            prevout: random_outpoint(rng),
            script_sig: random_vec(rng, 40),
            sequence: rng.next_u32(),
            spent_script: random_vec(rng, 30),
        })
        .collect();
    let vout = (0..1 + rng.gen_range(3))
        .map(|_| TxOut {
            value: (rng.next_u64() >> 20) as i64,
            script_pubkey: random_vec(rng, 30),
        })
        .collect();
    Transaction {
        version: rng.next_u32() as i32 & 0x7fff_ffff,
        vin,
        vout,
        lock_time: rng.next_u32(),
    }
}

fn random_block(rng: &mut Lcg) -> Block {
    let stake = rng.gen_range(2) == 1;
    let header = BlockHeader {
        version: if stake { 4 | POS_VERSION_BIT } else { 4 },
        prev_block: random_hash(rng),
        merkle_root: random_hash(rng),
        height: rng.next_u32(),
        time: rng.next_u32(),
        bits: rng.next_u32(),
        nonce: rng.next_u32(),
        stake: stake.then(|| StakeProof {
            prevout: random_outpoint(rng),
            value: (rng.next_u64() >> 16) as i64,
            time_from: rng.next_u32(),
            script_pubkey: random_vec(rng, 25),
        }),
    };
    let transactions = (0..rng.gen_range(4)).map(|_| random_tx(rng)).collect();
    Block {
        header,
        transactions,
    }
}

#[test]
fn random_blocks_reencode_identically() {
    let mut rng = Lcg::new(0x5eed_0001);
    for _ in 0..200 {
        let block = random_block(&mut rng);
        let bytes = block.to_bytes();
        let decoded = Block::from_bytes(&bytes).expect("decode");
        assert_eq!(decoded.hash(), block.hash());
        assert_eq!(decoded.to_bytes(), bytes);
    }
}

#[test]
fn truncated_blocks_never_decode() {
    let mut rng = Lcg::new(0x5eed_0002);
    for _ in 0..100 {
        let bytes = random_block(&mut rng).to_bytes();
        let cut = rng.gen_range(bytes.len());
        assert!(Block::from_bytes(&bytes[..cut]).is_err(), "cut at {cut}");
    }
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut rng = Lcg::new(0x5eed_0003);
    let tx = random_tx(&mut rng);
    let mut bytes = encode(&tx);
    bytes.push(rng.next_u8());
    assert_eq!(decode::<Transaction>(&bytes), Err(DecodeError::TrailingBytes));
}

#[test]
fn garbage_input_returns_errors() {
    let mut rng = Lcg::new(0x5eed_0004);
    for _ in 0..500 {
        let bytes = random_vec(&mut rng, 300);
        let _ = Block::from_bytes(&bytes);
        let _ = decode::<Transaction>(&bytes);
    }
}
