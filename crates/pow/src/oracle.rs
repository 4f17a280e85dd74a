//! The hashing primitive behind both proof kinds.

use hybridd_consensus::Hash256;
use hybridd_primitives::block::BlockHeader;
use hybridd_primitives::hash::sha256d;
use primitive_types::U256;

/// Hash function and target comparison used by proof checks.
pub trait ProofOracle: Send + Sync {
    fn hash_header(&self, header: &BlockHeader) -> Hash256;

    fn hash_bytes(&self, data: &[u8]) -> Hash256;

    fn meets_target(&self, digest: &Hash256, target: &U256) -> bool {
        U256::from_little_endian(digest) <= *target
    }
}

/// Double SHA-256, the network's block hash.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256dOracle;

impl ProofOracle for Sha256dOracle {
    fn hash_header(&self, header: &BlockHeader) -> Hash256 {
        header.hash()
    }

    fn hash_bytes(&self, data: &[u8]) -> Hash256 {
        sha256d(data)
    }
}
