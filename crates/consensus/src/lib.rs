//! Consensus constants, network parameters, and hex helpers.

pub mod constants;
pub mod money;
pub mod params;

pub use params::{
    consensus_params, hash256_from_hex, hash256_to_hex, Checkpoint, ConsensusParams, HexError,
    Network,
};

/// 32-byte hash in internal (little-endian) byte order.
pub type Hash256 = [u8; 32];
