//! Stake header validation.

use hybridd_consensus::constants::MIN_STAKE_AMOUNT;
use hybridd_consensus::money::money_range;
use hybridd_consensus::ConsensusParams;
use hybridd_pow::difficulty::{compact_to_u256, CompactError};
use hybridd_pow::ProofOracle;
use hybridd_primitives::block::{BlockHeader, BlockMode};
use primitive_types::U256;

use crate::kernel::{kernel_hash, stake_modifier, stake_target};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PosError {
    InvalidHeader(&'static str),
    StakeTooSmall,
    StakeTooYoung,
    KernelMissesTarget,
    Compact(CompactError),
}

impl std::fmt::Display for PosError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PosError::InvalidHeader(message) => write!(f, "{message}"),
            PosError::StakeTooSmall => write!(f, "stake value below minimum"),
            PosError::StakeTooYoung => write!(f, "stake output below minimum age"),
            PosError::KernelMissesTarget => write!(f, "stake kernel does not meet target"),
            PosError::Compact(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PosError {}

impl From<CompactError> for PosError {
    fn from(err: CompactError) -> Self {
        PosError::Compact(err)
    }
}

pub fn validate_pos_header(
    header: &BlockHeader,
    params: &ConsensusParams,
    oracle: &dyn ProofOracle,
) -> Result<(), PosError> {
    if header.mode() != BlockMode::ProofOfStake {
        return Err(PosError::InvalidHeader("pos validation on work header"));
    }
    let Some(stake) = header.stake.as_ref() else {
        return Err(PosError::InvalidHeader("pos header missing stake proof"));
    };
    if stake.prevout.is_null() {
        return Err(PosError::InvalidHeader("pos header stakes null outpoint"));
    }
    if !money_range(stake.value) || stake.value < MIN_STAKE_AMOUNT {
        return Err(PosError::StakeTooSmall);
    }
    if header.time < stake.time_from {
        return Err(PosError::InvalidHeader("stake time precedes its output"));
    }
    if i64::from(stake.time_from) + params.min_stake_age > i64::from(header.time) {
        return Err(PosError::StakeTooYoung);
    }

    let per_coin = compact_to_u256(header.bits)?;
    if per_coin.is_zero() {
        return Err(PosError::InvalidHeader("pos target is zero"));
    }
    if per_coin > U256::from_little_endian(&params.pos_limit) {
        return Err(PosError::InvalidHeader("pos target above limit"));
    }

    let target = stake_target(stake.value, header.bits)?;
    let modifier = stake_modifier(&header.prev_block);
    let digest = kernel_hash(oracle, modifier, stake.time_from, &stake.prevout, header.time);
    // Strict comparison: the kernel must fall below the weighted target.
    if U256::from_little_endian(&digest) >= target {
        return Err(PosError::KernelMissesTarget);
    }
    Ok(())
}
