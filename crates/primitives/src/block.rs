//! Block header and block types.
//!
//! The header carries its mode in a version bit. Stake headers append the
//! staked output so the kernel can be checked from the header alone.

use std::fmt;

use hybridd_consensus::constants::POS_VERSION_BIT;
use hybridd_consensus::money::Amount;
use hybridd_consensus::Hash256;

use crate::encoding::{decode, encode, Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;
use crate::transaction::Transaction;

/// How a block proves its right to extend the chain. Fixed when the block
/// is first accepted and stored with it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BlockMode {
    ProofOfWork,
    ProofOfStake,
}

impl BlockMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockMode::ProofOfWork => "proof-of-work",
            BlockMode::ProofOfStake => "proof-of-stake",
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            BlockMode::ProofOfWork => 0,
            BlockMode::ProofOfStake => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(BlockMode::ProofOfWork),
            1 => Some(BlockMode::ProofOfStake),
            _ => None,
        }
    }
}

impl fmt::Display for BlockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The output a stake block spends to prove eligibility.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakeProof {
    pub prevout: OutPoint,
    pub value: Amount,
    /// Timestamp of the block that created `prevout`.
    pub time_from: u32,
    pub script_pubkey: Vec<u8>,
}

impl Encodable for StakeProof {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.prevout.consensus_encode(encoder);
        encoder.write_i64_le(self.value);
        encoder.write_u32_le(self.time_from);
        encoder.write_var_bytes(&self.script_pubkey);
    }
}

impl Decodable for StakeProof {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            prevout: OutPoint::consensus_decode(decoder)?,
            value: decoder.read_i64_le()?,
            time_from: decoder.read_u32_le()?,
            script_pubkey: decoder.read_var_bytes()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub height: u32,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
    /// Present exactly when the version carries the stake bit.
    pub stake: Option<StakeProof>,
}

impl BlockHeader {
    pub fn mode(&self) -> BlockMode {
        if self.version & POS_VERSION_BIT != 0 {
            BlockMode::ProofOfStake
        } else {
            BlockMode::ProofOfWork
        }
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&encode(self))
    }
}

impl Encodable for BlockHeader {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i32_le(self.version);
        encoder.write_hash(&self.prev_block);
        encoder.write_hash(&self.merkle_root);
        encoder.write_u32_le(self.height);
        encoder.write_u32_le(self.time);
        encoder.write_u32_le(self.bits);
        encoder.write_u32_le(self.nonce);
        if let Some(stake) = &self.stake {
            stake.consensus_encode(encoder);
        }
    }
}

impl Decodable for BlockHeader {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let version = decoder.read_i32_le()?;
        let prev_block = decoder.read_hash()?;
        let merkle_root = decoder.read_hash()?;
        let height = decoder.read_u32_le()?;
        let time = decoder.read_u32_le()?;
        let bits = decoder.read_u32_le()?;
        let nonce = decoder.read_u32_le()?;
        let stake = if version & POS_VERSION_BIT != 0 {
            Some(StakeProof::consensus_decode(decoder)?)
        } else {
            None
        };
        Ok(Self {
            version,
            prev_block,
            merkle_root,
            height,
            time,
            bits,
            nonce,
            stake,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn mode(&self) -> BlockMode {
        self.header.mode()
    }

    pub fn height(&self) -> i64 {
        i64::from(self.header.height)
    }

    pub fn time(&self) -> i64 {
        i64::from(self.header.time)
    }

    pub fn compute_merkle_root(&self) -> Hash256 {
        let txids: Vec<Hash256> = self.transactions.iter().map(Transaction::txid).collect();
        merkle_root(&txids)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode(bytes)
    }
}

impl Encodable for Block {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.header.consensus_encode(encoder);
        encoder.write_list(&self.transactions);
    }
}

impl Decodable for Block {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            header: BlockHeader::consensus_decode(decoder)?,
            transactions: decoder.read_list()?,
        })
    }
}

/// Bitcoin-style merkle root; an odd level pairs its last node with itself.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return [0u8; 32];
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(&pair[0]);
                buf[32..].copy_from_slice(right);
                sha256d(&buf)
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stake_header() -> BlockHeader {
        BlockHeader {
            version: 4 | POS_VERSION_BIT,
            prev_block: [1u8; 32],
            merkle_root: [2u8; 32],
            height: 103,
            time: 1_700_000_000,
            bits: 0x200f_ffff,
            nonce: 0,
            stake: Some(StakeProof {
                prevout: OutPoint {
                    hash: [3u8; 32],
                    index: 0,
                },
                value: 100,
                time_from: 1_699_999_000,
                script_pubkey: vec![0x51],
            }),
        }
    }

    #[test]
    fn mode_follows_version_bit() {
        let mut header = stake_header();
        assert_eq!(header.mode(), BlockMode::ProofOfStake);
        header.version = 4;
        header.stake = None;
        assert_eq!(header.mode(), BlockMode::ProofOfWork);
    }

    #[test]
    fn stake_header_decodes_with_proof() {
        let header = stake_header();
        let decoded: BlockHeader = decode(&encode(&header)).expect("decode");
        assert_eq!(decoded, header);
    }

    #[test]
    fn stake_bit_without_proof_fails_to_decode() {
        let mut header = stake_header();
        header.stake = None;
        let bytes = encode(&header);
        assert_eq!(decode::<BlockHeader>(&bytes), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn mode_tags_are_stable() {
        for mode in [BlockMode::ProofOfWork, BlockMode::ProofOfStake] {
            assert_eq!(BlockMode::from_tag(mode.tag()), Some(mode));
        }
        assert_eq!(BlockMode::from_tag(7), None);
    }

    #[test]
    fn merkle_root_of_single_leaf_is_leaf() {
        assert_eq!(merkle_root(&[[9u8; 32]]), [9u8; 32]);
        let three = merkle_root(&[[1u8; 32], [2u8; 32], [3u8; 32]]);
        let four = merkle_root(&[[1u8; 32], [2u8; 32], [3u8; 32], [3u8; 32]]);
        assert_eq!(three, four);
    }
}
