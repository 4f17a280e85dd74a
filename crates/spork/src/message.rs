//! Spork wire messages.

use std::fmt;

use hybridd_consensus::constants::BLACKLIST_DISABLED_SINCE;
use hybridd_consensus::{hash256_to_hex, Hash256};
use hybridd_primitives::encoding::{decode, encode, Decodable, DecodeError, Decoder, Encodable, Encoder};
use hybridd_primitives::hash::sha256d;

use crate::ids::{spork_name, SPORK_15_FIRST_POS_BLOCK};

const KIND_PARAMETER: u8 = 0;
const KIND_CHECKPOINT: u8 = 1;
const KIND_BLACKLIST: u8 = 2;

const MAX_BLACKLIST_SCRIPT: usize = 10_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SporkPayload {
    /// Generic numeric parameter such as `SPORK_15_FIRST_POS_BLOCK`.
    Parameter { id: u32, value: i64 },
    /// Pins `block_hash` at `height`.
    Checkpoint { height: i64, block_hash: Hash256 },
    /// Blocks spends from `script_pubkey`; `since == -1` lifts the entry.
    Blacklist { script_pubkey: Vec<u8>, since: i64 },
}

/// The instance of a parameter an update overrides. Ordering rules apply
/// per key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SporkKey {
    Parameter(u32),
    Checkpoint(i64),
    Blacklist(Vec<u8>),
}

impl fmt::Display for SporkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SporkKey::Parameter(id) => match spork_name(*id) {
                Some(name) => f.write_str(name),
                None => write!(f, "spork {id}"),
            },
            SporkKey::Checkpoint(height) => write!(f, "checkpoint@{height}"),
            SporkKey::Blacklist(script) => write!(f, "blacklist:{}", hex(script)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SporkUpdate {
    pub payload: SporkPayload,
    /// Issuance time; strictly increasing per key.
    pub time_signed: i64,
    /// Consensus effect starts once local time reaches this.
    pub activation_time: i64,
    /// Opaque; verified by the relay layer before the update reaches us.
    pub signature: Vec<u8>,
}

impl SporkUpdate {
    /// An update that takes effect as soon as it is signed.
    pub fn new(payload: SporkPayload, time_signed: i64) -> Self {
        let activation_time = match &payload {
            SporkPayload::Blacklist { since, .. } if *since != BLACKLIST_DISABLED_SINCE => *since,
            _ => time_signed,
        };
        Self {
            payload,
            time_signed,
            activation_time,
            signature: Vec::new(),
        }
    }

    pub fn with_activation(mut self, activation_time: i64) -> Self {
        self.activation_time = activation_time;
        self
    }

    pub fn key(&self) -> SporkKey {
        match &self.payload {
            SporkPayload::Parameter { id, .. } => SporkKey::Parameter(*id),
            SporkPayload::Checkpoint { height, .. } => SporkKey::Checkpoint(*height),
            SporkPayload::Blacklist { script_pubkey, .. } => {
                SporkKey::Blacklist(script_pubkey.clone())
            }
        }
    }

    /// Identifier used for relay de-duplication; excludes the signature.
    pub fn hash(&self) -> Hash256 {
        let mut encoder = Encoder::new();
        self.encode_body(&mut encoder);
        sha256d(&encoder.into_inner())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode(bytes)
    }

    /// Payload checks that do not depend on registry state.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.time_signed <= 0 {
            return Err("spork signing time must be positive");
        }
        if self.activation_time < 0 {
            return Err("spork activation time is negative");
        }
        match &self.payload {
            SporkPayload::Parameter { id, value } => {
                if spork_name(*id).is_none() {
                    return Err("unknown spork id");
                }
                if *id == SPORK_15_FIRST_POS_BLOCK && *value < 1 {
                    return Err("first stake height must be positive");
                }
            }
            SporkPayload::Checkpoint { height, block_hash } => {
                if *height <= 0 {
                    return Err("checkpoint height must be above genesis");
                }
                if *block_hash == [0u8; 32] {
                    return Err("checkpoint hash is null");
                }
            }
            SporkPayload::Blacklist {
                script_pubkey,
                since,
            } => {
                if script_pubkey.is_empty() || script_pubkey.len() > MAX_BLACKLIST_SCRIPT {
                    return Err("blacklist script has invalid size");
                }
                if *since < BLACKLIST_DISABLED_SINCE {
                    return Err("blacklist since is negative");
                }
            }
        }
        Ok(())
    }

    fn encode_body(&self, encoder: &mut Encoder) {
        match &self.payload {
            SporkPayload::Parameter { id, value } => {
                encoder.write_u8(KIND_PARAMETER);
                encoder.write_u32_le(*id);
                encoder.write_i64_le(*value);
            }
            SporkPayload::Checkpoint { height, block_hash } => {
                encoder.write_u8(KIND_CHECKPOINT);
                encoder.write_i64_le(*height);
                encoder.write_hash(block_hash);
            }
            SporkPayload::Blacklist {
                script_pubkey,
                since,
            } => {
                encoder.write_u8(KIND_BLACKLIST);
                encoder.write_var_bytes(script_pubkey);
                encoder.write_i64_le(*since);
            }
        }
        encoder.write_i64_le(self.time_signed);
        encoder.write_i64_le(self.activation_time);
    }
}

impl fmt::Display for SporkUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            SporkPayload::Parameter { value, .. } => write!(f, "{}={value}", self.key())?,
            SporkPayload::Checkpoint { block_hash, .. } => {
                write!(f, "{}={}", self.key(), hash256_to_hex(block_hash))?
            }
            SporkPayload::Blacklist { since, .. } => write!(f, "{} since {since}", self.key())?,
        }
        write!(f, " (signed {}, active {})", self.time_signed, self.activation_time)
    }
}

impl Encodable for SporkUpdate {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.encode_body(encoder);
        encoder.write_var_bytes(&self.signature);
    }
}

impl Decodable for SporkUpdate {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let payload = match decoder.read_u8()? {
            KIND_PARAMETER => SporkPayload::Parameter {
                id: decoder.read_u32_le()?,
                value: decoder.read_i64_le()?,
            },
            KIND_CHECKPOINT => SporkPayload::Checkpoint {
                height: decoder.read_i64_le()?,
                block_hash: decoder.read_hash()?,
            },
            KIND_BLACKLIST => SporkPayload::Blacklist {
                script_pubkey: decoder.read_var_bytes()?,
                since: decoder.read_i64_le()?,
            },
            _ => return Err(DecodeError::InvalidData("unknown spork message kind")),
        };
        Ok(Self {
            payload,
            time_signed: decoder.read_i64_le()?,
            activation_time: decoder.read_i64_le()?,
            signature: decoder.read_var_bytes()?,
        })
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
