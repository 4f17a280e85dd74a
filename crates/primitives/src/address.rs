//! Base58Check addresses and their standard scripts.

use std::fmt;

use hybridd_consensus::ConsensusParams;

use crate::hash::sha256d;

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressError {
    InvalidLength,
    InvalidCharacter,
    InvalidChecksum,
    UnknownPrefix,
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            AddressError::InvalidLength => "invalid address length",
            AddressError::InvalidCharacter => "invalid base58 character",
            AddressError::InvalidChecksum => "address checksum mismatch",
            AddressError::UnknownPrefix => "address is for another network",
        };
        f.write_str(message)
    }
}

impl std::error::Error for AddressError {}

pub fn address_to_script_pubkey(
    address: &str,
    params: &ConsensusParams,
) -> Result<Vec<u8>, AddressError> {
    let payload = base58check_decode(address.trim())?;
    let Some((prefix, hash)) = payload.split_first() else {
        return Err(AddressError::InvalidLength);
    };
    if hash.len() != 20 {
        return Err(AddressError::InvalidLength);
    }
    if *prefix == params.pubkey_address_prefix {
        let mut script = vec![OP_DUP, OP_HASH160, 0x14];
        script.extend_from_slice(hash);
        script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        Ok(script)
    } else if *prefix == params.script_address_prefix {
        let mut script = vec![OP_HASH160, 0x14];
        script.extend_from_slice(hash);
        script.push(OP_EQUAL);
        Ok(script)
    } else {
        Err(AddressError::UnknownPrefix)
    }
}

pub fn script_pubkey_to_address(script: &[u8], params: &ConsensusParams) -> Option<String> {
    let (prefix, hash) = match script {
        [OP_DUP, OP_HASH160, 0x14, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            (params.pubkey_address_prefix, hash)
        }
        [OP_HASH160, 0x14, hash @ .., OP_EQUAL] if hash.len() == 20 => {
            (params.script_address_prefix, hash)
        }
        _ => return None,
    };
    let mut payload = Vec::with_capacity(21);
    payload.push(prefix);
    payload.extend_from_slice(hash);
    Some(base58check_encode(&payload))
}

fn base58check_encode(payload: &[u8]) -> String {
    let mut data = payload.to_vec();
    data.extend_from_slice(&sha256d(payload)[..4]);

    // Base-58 digits, least significant first.
    let mut digits: Vec<u8> = Vec::new();
    for byte in &data {
        let mut carry = u32::from(*byte);
        for digit in digits.iter_mut() {
            carry += u32::from(*digit) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }
    let zeros = data.iter().take_while(|byte| **byte == 0).count();
    std::iter::repeat('1')
        .take(zeros)
        .chain(digits.iter().rev().map(|digit| ALPHABET[*digit as usize] as char))
        .collect()
}

fn base58check_decode(input: &str) -> Result<Vec<u8>, AddressError> {
    if input.is_empty() {
        return Err(AddressError::InvalidLength);
    }
    // Bytes, least significant first.
    let mut bytes: Vec<u8> = Vec::new();
    for ch in input.bytes() {
        let value = ALPHABET
            .iter()
            .position(|candidate| *candidate == ch)
            .ok_or(AddressError::InvalidCharacter)?;
        let mut carry = value as u32;
        for byte in bytes.iter_mut() {
            carry += u32::from(*byte) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }
    let zeros = input.bytes().take_while(|ch| *ch == b'1').count();
    let mut data = vec![0u8; zeros];
    data.extend(bytes.iter().rev());

    if data.len() < 4 {
        return Err(AddressError::InvalidLength);
    }
    let (payload, checksum) = data.split_at(data.len() - 4);
    if checksum != &sha256d(payload)[..4] {
        return Err(AddressError::InvalidChecksum);
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridd_consensus::{consensus_params, Network};

    fn p2pkh(hash: [u8; 20]) -> Vec<u8> {
        let mut script = vec![OP_DUP, OP_HASH160, 0x14];
        script.extend_from_slice(&hash);
        script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        script
    }

    #[test]
    fn address_maps_back_to_script() {
        let params = consensus_params(Network::Regtest);
        let script = p2pkh([0x42; 20]);
        let address = script_pubkey_to_address(&script, &params).expect("standard script");
        assert_eq!(address_to_script_pubkey(&address, &params), Ok(script));
    }

    #[test]
    fn known_base58check_vector() {
        // Version 0 payload of twenty zero bytes.
        assert_eq!(
            base58check_encode(&[0u8; 21]),
            "1111111111111111111114oLvT2"
        );
        assert_eq!(base58check_decode("1111111111111111111114oLvT2"), Ok(vec![0u8; 21]));
    }

    #[test]
    fn other_network_prefix_is_rejected() {
        let main = consensus_params(Network::Mainnet);
        let reg = consensus_params(Network::Regtest);
        let address = script_pubkey_to_address(&p2pkh([1; 20]), &main).expect("address");
        assert_eq!(
            address_to_script_pubkey(&address, &reg),
            Err(AddressError::UnknownPrefix)
        );
    }

    #[test]
    fn corrupted_address_fails_checksum() {
        let params = consensus_params(Network::Regtest);
        let mut address = script_pubkey_to_address(&p2pkh([9; 20]), &params).expect("address");
        let last = address.pop().expect("non-empty");
        address.push(if last == 'a' { 'b' } else { 'a' });
        assert_eq!(
            address_to_script_pubkey(&address, &params),
            Err(AddressError::InvalidChecksum)
        );
    }

    #[test]
    fn non_standard_script_has_no_address() {
        let params = consensus_params(Network::Regtest);
        assert_eq!(script_pubkey_to_address(&[0x51], &params), None);
    }
}
