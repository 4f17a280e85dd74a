//! Proof-of-stake kernel and header validation.

pub mod kernel;
pub mod validation;

pub use kernel::{kernel_hash, stake_modifier, stake_target};
pub use validation::{validate_pos_header, PosError};
