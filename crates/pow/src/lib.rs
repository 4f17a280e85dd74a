//! Compact targets, block work, and the proof-of-work check.

pub mod difficulty;
pub mod oracle;
pub mod validation;

pub use oracle::{ProofOracle, Sha256dOracle};
pub use validation::{validate_pow_header, PowError};
