//! Per-network consensus parameters.

use std::fmt;

use crate::constants::FIRST_POS_DISABLED;
use crate::Hash256;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Some(Network::Mainnet),
            "testnet" | "test" => Some(Network::Testnet),
            "regtest" => Some(Network::Regtest),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Checkpoint {
    pub height: i64,
    pub hash: Hash256,
}

#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub network: Network,
    pub genesis_time: u32,
    pub genesis_bits: u32,
    pub genesis_nonce: u32,
    /// Easiest target a work block may declare.
    pub pow_limit: Hash256,
    /// Easiest target a stake block may declare.
    pub pos_limit: Hash256,
    /// Seconds a stake output must age before it can stake.
    pub min_stake_age: i64,
    pub pow_target_spacing: i64,
    /// Compiled-in pins; operators add more with `addcheckpoint`.
    pub checkpoints: Vec<Checkpoint>,
    /// `FIRST_POS_HEIGHT` before any spork overrides it.
    pub default_first_pos_height: i64,
    /// Base58 version byte for pay-to-pubkey-hash addresses.
    pub pubkey_address_prefix: u8,
    pub script_address_prefix: u8,
}

pub fn consensus_params(network: Network) -> ConsensusParams {
    match network {
        Network::Mainnet => ConsensusParams {
            network,
            genesis_time: 1_559_435_552,
            genesis_bits: 0x1e0f_fff0,
            genesis_nonce: 0,
            pow_limit: limit_from_leading_zero_bits(20),
            pos_limit: limit_from_leading_zero_bits(24),
            min_stake_age: 5 * 60,
            pow_target_spacing: 90,
            checkpoints: Vec::new(),
            default_first_pos_height: FIRST_POS_DISABLED,
            pubkey_address_prefix: 58,
            script_address_prefix: 53,
        },
        Network::Testnet => ConsensusParams {
            network,
            genesis_time: 1_524_344_801,
            genesis_bits: 0x1e0f_fff0,
            genesis_nonce: 0,
            pow_limit: limit_from_leading_zero_bits(20),
            pos_limit: limit_from_leading_zero_bits(24),
            min_stake_age: 180,
            pow_target_spacing: 60,
            checkpoints: Vec::new(),
            default_first_pos_height: FIRST_POS_DISABLED,
            pubkey_address_prefix: 127,
            script_address_prefix: 19,
        },
        Network::Regtest => ConsensusParams {
            network,
            genesis_time: 1_417_713_337,
            genesis_bits: 0x207f_ffff,
            genesis_nonce: 0,
            pow_limit: limit_from_leading_zero_bits(1),
            pos_limit: limit_from_leading_zero_bits(4),
            min_stake_age: 0,
            pow_target_spacing: 150,
            checkpoints: Vec::new(),
            default_first_pos_height: FIRST_POS_DISABLED,
            pubkey_address_prefix: 140,
            script_address_prefix: 19,
        },
    }
}

/// `~uint256(0) >> zeros` in little-endian byte order.
fn limit_from_leading_zero_bits(zeros: u32) -> Hash256 {
    let mut out = [0xffu8; 32];
    let mut remaining = zeros;
    for byte in out.iter_mut().rev() {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(8);
        *byte = if take == 8 { 0 } else { 0xff >> take };
        remaining -= take;
    }
    out
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HexError {
    InvalidLength,
    InvalidHex,
}

impl fmt::Display for HexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HexError::InvalidLength => write!(f, "hash must be 64 hex characters"),
            HexError::InvalidHex => write!(f, "invalid hex digit"),
        }
    }
}

impl std::error::Error for HexError {}

/// Parses a display-order (big-endian) hex string into internal byte order.
///
/// Unlike the lenient RPC parsers, the input must be exactly 64 hex digits
/// (an optional `0x` prefix aside); governance messages carrying a
/// short or padded hash are treated as malformed.
pub fn hash256_from_hex(input: &str) -> Result<Hash256, HexError> {
    let trimmed = input.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex.len() != 64 {
        return Err(HexError::InvalidLength);
    }
    let mut out = [0u8; 32];
    for (idx, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let hi = hex_digit(chunk[0]).ok_or(HexError::InvalidHex)?;
        let lo = hex_digit(chunk[1]).ok_or(HexError::InvalidHex)?;
        out[31 - idx] = (hi << 4) | lo;
    }
    Ok(out)
}

pub fn hash256_to_hex(hash: &Hash256) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(64);
    for byte in hash.iter().rev() {
        out.push(DIGITS[(byte >> 4) as usize] as char);
        out.push(DIGITS[(byte & 0x0f) as usize] as char);
    }
    out
}

fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
