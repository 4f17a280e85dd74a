use hybridd_consensus::ConsensusParams;
use hybridd_primitives::block::{BlockHeader, BlockMode};
use primitive_types::U256;

use crate::difficulty::{compact_to_u256, CompactError};
use crate::oracle::ProofOracle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowError {
    InvalidHeader(&'static str),
    InvalidBits(&'static str),
    HashMismatch,
    Compact(CompactError),
}

impl std::fmt::Display for PowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowError::InvalidHeader(message) => write!(f, "{message}"),
            PowError::InvalidBits(message) => write!(f, "{message}"),
            PowError::HashMismatch => write!(f, "pow hash does not meet target"),
            PowError::Compact(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PowError {}

impl From<CompactError> for PowError {
    fn from(err: CompactError) -> Self {
        PowError::Compact(err)
    }
}

pub fn validate_pow_header(
    header: &BlockHeader,
    params: &ConsensusParams,
    oracle: &dyn ProofOracle,
) -> Result<(), PowError> {
    if header.mode() != BlockMode::ProofOfWork {
        return Err(PowError::InvalidHeader("pow validation on stake header"));
    }

    let target = compact_to_u256(header.bits)?;
    if target.is_zero() {
        return Err(PowError::InvalidBits("pow target is zero"));
    }
    if target > U256::from_little_endian(&params.pow_limit) {
        return Err(PowError::InvalidBits("pow target above limit"));
    }

    let digest = oracle.hash_header(header);
    if !oracle.meets_target(&digest, &target) {
        return Err(PowError::HashMismatch);
    }
    Ok(())
}
