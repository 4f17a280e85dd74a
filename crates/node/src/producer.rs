//! Block production for `generate`.

use hybridd_chainstate::ConsensusRules;
use hybridd_consensus::constants::{BASE_BLOCK_VERSION, POS_VERSION_BIT};
use hybridd_consensus::money::{Amount, COIN};
use hybridd_consensus::Hash256;
use hybridd_pos::validate_pos_header;
use hybridd_pow::difficulty::target_to_compact;
use hybridd_pow::validate_pow_header;
use hybridd_primitives::block::{Block, BlockHeader, BlockMode, StakeProof};
use hybridd_primitives::hash::sha256d;
use hybridd_primitives::outpoint::OutPoint;
use hybridd_primitives::transaction::Transaction;

const BLOCK_REWARD: Amount = 50 * COIN;
const STAKE_ATTEMPTS: u32 = 10_000;

/// What the next block on the active tip must look like.
#[derive(Clone, Debug)]
pub struct BlockTemplate {
    pub parent: Hash256,
    pub height: i64,
    pub mode: BlockMode,
    pub time: i64,
    pub transactions: Vec<Transaction>,
}

pub trait BlockProducer {
    fn produce(&mut self, template: &BlockTemplate, rules: &ConsensusRules)
        -> Result<Block, String>;
}

/// Easiest-target producer for regtest: grinds nonces for work blocks and
/// searches synthetic stake outputs for stake blocks.
#[derive(Clone, Debug)]
pub struct RegtestProducer {
    payout_script: Vec<u8>,
    stake_value: Amount,
}

impl RegtestProducer {
    pub fn new(payout_script: Vec<u8>) -> Self {
        Self {
            payout_script,
            stake_value: 100 * COIN,
        }
    }

    fn stake_proof(&self, template: &BlockTemplate, rules: &ConsensusRules, attempt: u32) -> StakeProof {
        let mut seed = template.parent.to_vec();
        seed.extend_from_slice(&template.height.to_le_bytes());
        StakeProof {
            prevout: OutPoint {
                hash: sha256d(&seed),
                index: attempt,
            },
            value: self.stake_value,
            time_from: (template.time - rules.params().min_stake_age).max(0) as u32,
            script_pubkey: self.payout_script.clone(),
        }
    }
}

impl BlockProducer for RegtestProducer {
    fn produce(
        &mut self,
        template: &BlockTemplate,
        rules: &ConsensusRules,
    ) -> Result<Block, String> {
        let height = u32::try_from(template.height)
            .map_err(|_| format!("height {} out of range", template.height))?;
        let time = u32::try_from(template.time)
            .map_err(|_| format!("time {} out of range", template.time))?;
        let params = rules.params();

        let mut transactions = vec![Transaction::coinbase(
            height,
            BLOCK_REWARD,
            self.payout_script.clone(),
        )];
        transactions.extend(template.transactions.iter().cloned());
        let (version, bits) = match template.mode {
            BlockMode::ProofOfWork => (BASE_BLOCK_VERSION, target_to_compact(&params.pow_limit)),
            BlockMode::ProofOfStake => (
                BASE_BLOCK_VERSION | POS_VERSION_BIT,
                target_to_compact(&params.pos_limit),
            ),
        };
        let mut block = Block {
            header: BlockHeader {
                version,
                prev_block: template.parent,
                merkle_root: [0u8; 32],
                height,
                time,
                bits,
                nonce: 0,
                stake: None,
            },
            transactions,
        };
        block.header.merkle_root = block.compute_merkle_root();

        match template.mode {
            BlockMode::ProofOfWork => loop {
                if validate_pow_header(&block.header, params, rules.oracle()).is_ok() {
                    return Ok(block);
                }
                block.header.nonce = block
                    .header
                    .nonce
                    .checked_add(1)
                    .ok_or_else(|| format!("nonce space exhausted at height {height}"))?;
            },
            BlockMode::ProofOfStake => {
                for attempt in 0..STAKE_ATTEMPTS {
                    block.header.stake = Some(self.stake_proof(template, rules, attempt));
                    if validate_pos_header(&block.header, params, rules.oracle()).is_ok() {
                        return Ok(block);
                    }
                }
                Err(format!("no stake kernel found at height {height}"))
            }
        }
    }
}
