//! Chain selection, checkpoint enforcement, and deterministic replay.

pub mod blockstore;
pub mod checkpoints;
pub mod index;
pub mod orphans;
pub mod reindex;
pub mod validation;

pub use checkpoints::{CheckpointEntry, CheckpointSource, CheckpointTable};
pub use index::{BlockHandle, BlockInfo, ChainIndex, ChainTip, TipChange, TipInfo, TipStatus};
pub use orphans::OrphanPool;
pub use reindex::{FatalError, ReindexDriver, ReindexStats};
pub use validation::{ConsensusRules, RejectReason};
