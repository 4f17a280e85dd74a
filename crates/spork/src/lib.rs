//! Network-gossiped governance parameters ("sporks").
//!
//! A spork overrides a consensus parameter at runtime. Every update carries
//! the time it was signed, which orders updates to the same parameter, and
//! an activation time before which it has no consensus effect.

pub mod command;
pub mod ids;
pub mod message;
pub mod registry;

pub use command::parse_command;
pub use ids::{spork_id, spork_name, SPORK_15_FIRST_POS_BLOCK};
pub use message::{SporkKey, SporkPayload, SporkUpdate};
pub use registry::{SporkError, SporkRegistry};
