//! Consensus-wide constants shared across validation.

use crate::money::{Amount, COIN};

/// Header version bit marking a proof-of-stake block.
pub const POS_VERSION_BIT: i32 = 0x0100_0000;
/// Base block version produced by this node.
pub const BASE_BLOCK_VERSION: i32 = 4;

/// Number of ancestors used for median time past.
pub const MEDIAN_TIME_SPAN: usize = 11;
/// How far ahead of local time a work block may be stamped.
pub const MAX_FUTURE_BLOCK_TIME: i64 = 2 * 60 * 60;
/// How far ahead of local time a stake block may be stamped.
pub const MAX_POS_BLOCK_AHEAD_TIME: i64 = 180;

/// Smallest output value that may be used as a stake.
pub const MIN_STAKE_AMOUNT: Amount = COIN;
/// Stake weight divisor applied before scaling the per-coin target.
pub const STAKE_WEIGHT_DIVISOR: Amount = 100;

/// `FIRST_POS_HEIGHT` while stake mode is unscheduled.
pub const FIRST_POS_DISABLED: i64 = i64::MAX;

/// Checkpoint sporks older than this are no longer relayed or enforced.
pub const SPORK_CHECKPOINT_MAX_AGE: i64 = 30 * 24 * 60 * 60;
/// Blacklist sporks older than this are no longer relayed or enforced.
pub const SPORK_BLACKLIST_MAX_AGE: i64 = 3 * 30 * 24 * 60 * 60;
/// `since` value of a blacklist spork that lifts the entry.
pub const BLACKLIST_DISABLED_SINCE: i64 = -1;

pub const DEFAULT_MAX_ORPHAN_BLOCKS: usize = 750;
pub const DEFAULT_ORPHAN_EXPIRY_SECS: i64 = 20 * 60;
/// Hashes of blocks with invalid proofs remembered to short-cut resubmission.
pub const MAX_FAILED_BLOCKS: usize = 10_000;

/// The maximum allowed size for a serialized block, in bytes (network rule).
pub const MAX_BLOCK_SIZE: usize = 2_000_000;
