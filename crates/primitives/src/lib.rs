//! Block and transaction types with their consensus serialization.

pub mod address;
pub mod block;
pub mod encoding;
pub mod genesis;
pub mod hash;
pub mod outpoint;
pub mod transaction;

pub use address::{address_to_script_pubkey, script_pubkey_to_address, AddressError};
pub use block::{merkle_root, Block, BlockHeader, BlockMode, StakeProof};
pub use encoding::{decode, encode, Decodable, DecodeError, Decoder, Encodable, Encoder};
pub use genesis::genesis_block;
pub use hash::{hash160, sha256, sha256d};
pub use outpoint::OutPoint;
pub use transaction::{Transaction, TxIn, TxOut};
