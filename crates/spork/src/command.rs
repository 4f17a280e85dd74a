//! Operator command syntax for issuing sporks.
//!
//! ```text
//! <name|id> <value>
//! checkpoint <height> <block hash>
//! blacklist <since|-1> <address>
//! ```

use hybridd_consensus::{hash256_from_hex, ConsensusParams};
use hybridd_primitives::address::address_to_script_pubkey;

use crate::ids::spork_id;
use crate::message::{SporkPayload, SporkUpdate};
use crate::registry::SporkError;

/// Builds an update signed at `now` from operator arguments.
pub fn parse_command(
    args: &[&str],
    now: i64,
    params: &ConsensusParams,
) -> Result<SporkUpdate, SporkError> {
    let payload = match args {
        [kind, height, hash] if kind.eq_ignore_ascii_case("checkpoint") => {
            SporkPayload::Checkpoint {
                height: parse_int(height, "checkpoint height is not a number")?,
                block_hash: hash256_from_hex(hash)
                    .map_err(|_| SporkError::Malformed("checkpoint hash is not a block id"))?,
            }
        }
        [kind, since, address] if kind.eq_ignore_ascii_case("blacklist") => {
            SporkPayload::Blacklist {
                script_pubkey: address_to_script_pubkey(address, params)
                    .map_err(|_| SporkError::Malformed("blacklist address is invalid"))?,
                since: parse_int(since, "blacklist since is not a number")?,
            }
        }
        [name, value] => {
            let id = spork_id(name)
                .or_else(|| name.parse().ok())
                .ok_or(SporkError::Malformed("unknown spork name"))?;
            SporkPayload::Parameter {
                id,
                value: parse_int(value, "spork value is not a number")?,
            }
        }
        _ => return Err(SporkError::Malformed("unrecognised spork command")),
    };
    let update = SporkUpdate::new(payload, now);
    update.validate().map_err(SporkError::Malformed)?;
    Ok(update)
}

fn parse_int(raw: &str, reason: &'static str) -> Result<i64, SporkError> {
    raw.trim().parse().map_err(|_| SporkError::Malformed(reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SPORK_15_FIRST_POS_BLOCK;
    use hybridd_consensus::{consensus_params, Network};
    use hybridd_primitives::address::script_pubkey_to_address;

    #[test]
    fn parses_parameter_by_name() {
        let params = consensus_params(Network::Regtest);
        let update = parse_command(&["SPORK_15_FIRST_POS_BLOCK", "103"], 50, &params)
            .expect("parse");
        assert_eq!(
            update.payload,
            SporkPayload::Parameter {
                id: SPORK_15_FIRST_POS_BLOCK,
                value: 103
            }
        );
        assert_eq!(update.time_signed, 50);
        assert_eq!(update.activation_time, 50);
    }

    #[test]
    fn short_checkpoint_hash_is_malformed() {
        let params = consensus_params(Network::Regtest);
        let err = parse_command(&["checkpoint", "7", "abcdef"], 50, &params)
            .expect_err("short hash");
        assert_eq!(err, SporkError::Malformed("checkpoint hash is not a block id"));
    }

    #[test]
    fn blacklist_resolves_address() {
        let params = consensus_params(Network::Regtest);
        let mut script = vec![0x76, 0xa9, 0x14];
        script.extend_from_slice(&[0x33; 20]);
        script.extend_from_slice(&[0x88, 0xac]);
        let address = script_pubkey_to_address(&script, &params).expect("address");
        let update =
            parse_command(&["blacklist", "900", &address], 50, &params).expect("parse");
        assert_eq!(
            update.payload,
            SporkPayload::Blacklist {
                script_pubkey: script,
                since: 900
            }
        );
        assert_eq!(update.activation_time, 900);
    }

    #[test]
    fn garbage_is_rejected() {
        let params = consensus_params(Network::Regtest);
        assert!(parse_command(&["nope"], 1, &params).is_err());
        assert!(parse_command(&["SPORK_99", "1"], 1, &params).is_err());
    }
}
