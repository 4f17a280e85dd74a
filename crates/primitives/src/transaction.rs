//! Transaction types.
//!
//! Script evaluation and fee policy live outside this crate. An input
//! carries the script of the output it spends so that consensus filters
//! (the address blacklist) can be applied without a UTXO lookup.

use hybridd_consensus::money::{money_range, Amount};
use hybridd_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    /// `scriptPubKey` of the spent output, empty for coinbase inputs.
    pub spent_script: Vec<u8>,
}

impl TxIn {
    pub fn spending(prevout: OutPoint, spent_script: Vec<u8>) -> Self {
        Self {
            prevout,
            script_sig: Vec::new(),
            sequence: u32::MAX,
            spent_script,
        }
    }
}

impl Encodable for TxIn {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.prevout.consensus_encode(encoder);
        encoder.write_var_bytes(&self.script_sig);
        encoder.write_u32_le(self.sequence);
        encoder.write_var_bytes(&self.spent_script);
    }
}

impl Decodable for TxIn {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            prevout: OutPoint::consensus_decode(decoder)?,
            script_sig: decoder.read_var_bytes()?,
            sequence: decoder.read_u32_le()?,
            spent_script: decoder.read_var_bytes()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Vec<u8>,
}

impl Encodable for TxOut {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.script_pubkey);
    }
}

impl Decodable for TxOut {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            value: decoder.read_i64_le()?,
            script_pubkey: decoder.read_var_bytes()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// Coinbase paying `value` to `script_pubkey`; `height` keeps coinbases
    /// at different heights distinct.
    pub fn coinbase(height: u32, value: Amount, script_pubkey: Vec<u8>) -> Self {
        let mut script_sig = Vec::with_capacity(5);
        script_sig.push(4);
        script_sig.extend_from_slice(&height.to_le_bytes());
        Self {
            version: 1,
            vin: vec![TxIn {
                prevout: OutPoint::null(),
                script_sig,
                sequence: u32::MAX,
                spent_script: Vec::new(),
            }],
            vout: vec![TxOut {
                value,
                script_pubkey,
            }],
            lock_time: 0,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    pub fn txid(&self) -> Hash256 {
        sha256d(&crate::encoding::encode(self))
    }

    /// Scripts this transaction spends from, skipping coinbase inputs.
    pub fn spent_scripts(&self) -> impl Iterator<Item = &[u8]> {
        self.vin
            .iter()
            .filter(|input| !input.prevout.is_null())
            .map(|input| input.spent_script.as_slice())
    }

    /// Context-free sanity checks.
    pub fn check(&self) -> Result<(), &'static str> {
        if self.vin.is_empty() {
            return Err("bad-txns-vin-empty");
        }
        if self.vout.is_empty() {
            return Err("bad-txns-vout-empty");
        }
        let mut total: Amount = 0;
        for output in &self.vout {
            if !money_range(output.value) {
                return Err("bad-txns-vout-outofrange");
            }
            total = total
                .checked_add(output.value)
                .filter(|sum| money_range(*sum))
                .ok_or("bad-txns-txouttotal-toolarge")?;
        }
        if self.is_coinbase() {
            let len = self.vin[0].script_sig.len();
            if !(2..=100).contains(&len) {
                return Err("bad-cb-length");
            }
        } else if self.vin.iter().any(|input| input.prevout.is_null()) {
            return Err("bad-txns-prevout-null");
        }
        Ok(())
    }
}

impl Encodable for Transaction {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i32_le(self.version);
        encoder.write_list(&self.vin);
        encoder.write_list(&self.vout);
        encoder.write_u32_le(self.lock_time);
    }
}

impl Decodable for Transaction {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            version: decoder.read_i32_le()?,
            vin: decoder.read_list()?,
            vout: decoder.read_list()?,
            lock_time: decoder.read_u32_le()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::decode;

    fn spend(script: &[u8]) -> Transaction {
        Transaction {
            version: 1,
            vin: vec![TxIn::spending(
                OutPoint {
                    hash: [7u8; 32],
                    index: 1,
                },
                script.to_vec(),
            )],
            vout: vec![TxOut {
                value: 5,
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn decode_restores_spent_script() {
        let tx = spend(&[0xa9, 0x14]);
        let decoded: Transaction = decode(&crate::encoding::encode(&tx)).expect("decode");
        assert_eq!(decoded, tx);
        assert_eq!(decoded.spent_scripts().collect::<Vec<_>>(), vec![[0xa9u8, 0x14].as_slice()]);
    }

    #[test]
    fn coinbase_has_no_spent_scripts() {
        let tx = Transaction::coinbase(3, 50, vec![0x51]);
        assert!(tx.is_coinbase());
        assert_eq!(tx.spent_scripts().count(), 0);
        assert_eq!(tx.check(), Ok(()));
    }

    #[test]
    fn check_rejects_negative_output() {
        let mut tx = spend(&[0x51]);
        tx.vout[0].value = -1;
        assert_eq!(tx.check(), Err("bad-txns-vout-outofrange"));
    }

    #[test]
    fn coinbase_txid_depends_on_height() {
        let a = Transaction::coinbase(1, 50, vec![0x51]);
        let b = Transaction::coinbase(2, 50, vec![0x51]);
        assert_ne!(a.txid(), b.txid());
    }
}
