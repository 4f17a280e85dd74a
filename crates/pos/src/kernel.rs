//! Stake kernel: the per-output lottery a stake block must win.

use hybridd_consensus::constants::STAKE_WEIGHT_DIVISOR;
use hybridd_consensus::money::Amount;
use hybridd_consensus::Hash256;
use hybridd_log::{log_category, Category};
use hybridd_pow::difficulty::{compact_to_u256, CompactError};
use hybridd_pow::ProofOracle;
use hybridd_primitives::encoding::Encoder;
use hybridd_primitives::outpoint::OutPoint;
use primitive_types::U256;

/// Modifier mixed into every kernel built on top of `prev_block`.
///
/// Taken from the parent id so a kernel cannot be ground before the parent
/// exists.
pub fn stake_modifier(prev_block: &Hash256) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&prev_block[..8]);
    u64::from_le_bytes(bytes)
}

pub fn kernel_hash(
    oracle: &dyn ProofOracle,
    modifier: u64,
    time_from: u32,
    prevout: &OutPoint,
    time_tx: u32,
) -> Hash256 {
    let mut encoder = Encoder::new();
    encoder.write_u64_le(modifier);
    encoder.write_u32_le(time_from);
    encoder.write_u32_le(prevout.index);
    encoder.write_hash(&prevout.hash);
    encoder.write_u32_le(time_tx);
    oracle.hash_bytes(&encoder.into_inner())
}

/// `(value / 100) * target(bits)`, saturating to the maximum target.
pub fn stake_target(value: Amount, bits: u32) -> Result<U256, CompactError> {
    let per_coin = compact_to_u256(bits)?;
    let weight = U256::from((value / STAKE_WEIGHT_DIVISOR).max(0) as u64);
    match per_coin.checked_mul(weight) {
        Some(target) => Ok(target),
        None => {
            log_category!(
                Category::Stake,
                "stake target overflow for value {value} at bits {bits:#010x}, using max"
            );
            Ok(U256::MAX)
        }
    }
}
