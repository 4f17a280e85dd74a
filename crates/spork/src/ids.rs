//! Spork identifiers and their compiled-in defaults.
//!
//! Only `SPORK_15_FIRST_POS_BLOCK` changes consensus in this node. The other
//! ids are accepted, stored, and reported so that mixed-version networks keep
//! relaying them.

pub const SPORK_2_INSTANTSEND_ENABLED: u32 = 10001;
pub const SPORK_3_INSTANTSEND_BLOCK_FILTERING: u32 = 10002;
pub const SPORK_5_INSTANTSEND_MAX_VALUE: u32 = 10004;
pub const SPORK_6_NEW_SIGS: u32 = 10005;
pub const SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT: u32 = 10007;
pub const SPORK_9_SUPERBLOCKS_ENABLED: u32 = 10008;
pub const SPORK_10_MASTERNODE_PAY_UPDATED_NODES: u32 = 10009;
pub const SPORK_12_RECONSIDER_BLOCKS: u32 = 10011;
pub const SPORK_14_REQUIRE_SENTINEL_FLAG: u32 = 10013;
pub const SPORK_15_FIRST_POS_BLOCK: u32 = 10014;
pub const SPORK_16_MASTERNODE_MIN_PROTOCOL: u32 = 10015;
pub const SPORK_17_NEWPROTO_ENFORCE: u32 = 10016;
pub const SPORK_18_DISABLE_IPV6_MNS: u32 = 10017;
pub const SPORK_19_BLACKLIST_ENABLED: u32 = 10018;
pub const SPORK_20_STAKEMINAGEV2: u32 = 10019;

/// Value meaning "off" for time-gated switches.
const OFF: i64 = 4_070_908_800;

pub(crate) struct KnownSpork {
    pub id: u32,
    pub name: &'static str,
    pub default: i64,
}

pub(crate) const KNOWN_SPORKS: [KnownSpork; 15] = [
    KnownSpork { id: SPORK_2_INSTANTSEND_ENABLED, name: "SPORK_2_INSTANTSEND_ENABLED", default: 0 },
    KnownSpork { id: SPORK_3_INSTANTSEND_BLOCK_FILTERING, name: "SPORK_3_INSTANTSEND_BLOCK_FILTERING", default: 0 },
    KnownSpork { id: SPORK_5_INSTANTSEND_MAX_VALUE, name: "SPORK_5_INSTANTSEND_MAX_VALUE", default: 1000 },
    KnownSpork { id: SPORK_6_NEW_SIGS, name: "SPORK_6_NEW_SIGS", default: OFF },
    KnownSpork { id: SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT, name: "SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT", default: OFF },
    KnownSpork { id: SPORK_9_SUPERBLOCKS_ENABLED, name: "SPORK_9_SUPERBLOCKS_ENABLED", default: 0 },
    KnownSpork { id: SPORK_10_MASTERNODE_PAY_UPDATED_NODES, name: "SPORK_10_MASTERNODE_PAY_UPDATED_NODES", default: OFF },
    KnownSpork { id: SPORK_12_RECONSIDER_BLOCKS, name: "SPORK_12_RECONSIDER_BLOCKS", default: 0 },
    KnownSpork { id: SPORK_14_REQUIRE_SENTINEL_FLAG, name: "SPORK_14_REQUIRE_SENTINEL_FLAG", default: OFF },
    // Replaced by the network's FIRST_POS_HEIGHT default at registry construction.
    KnownSpork { id: SPORK_15_FIRST_POS_BLOCK, name: "SPORK_15_FIRST_POS_BLOCK", default: i64::MAX },
    KnownSpork { id: SPORK_16_MASTERNODE_MIN_PROTOCOL, name: "SPORK_16_MASTERNODE_MIN_PROTOCOL", default: 70_208 },
    KnownSpork { id: SPORK_17_NEWPROTO_ENFORCE, name: "SPORK_17_NEWPROTO_ENFORCE", default: OFF },
    KnownSpork { id: SPORK_18_DISABLE_IPV6_MNS, name: "SPORK_18_DISABLE_IPV6_MNS", default: OFF },
    KnownSpork { id: SPORK_19_BLACKLIST_ENABLED, name: "SPORK_19_BLACKLIST_ENABLED", default: 0 },
    KnownSpork { id: SPORK_20_STAKEMINAGEV2, name: "SPORK_20_STAKEMINAGEV2", default: OFF },
];

pub fn spork_name(id: u32) -> Option<&'static str> {
    KNOWN_SPORKS
        .iter()
        .find(|known| known.id == id)
        .map(|known| known.name)
}

/// Looks up an id by name, case-insensitively.
pub fn spork_id(name: &str) -> Option<u32> {
    KNOWN_SPORKS
        .iter()
        .find(|known| known.name.eq_ignore_ascii_case(name.trim()))
        .map(|known| known.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_ids_agree() {
        for known in &KNOWN_SPORKS {
            assert_eq!(spork_id(known.name), Some(known.id));
            assert_eq!(spork_name(known.id), Some(known.name));
        }
        assert_eq!(spork_id("spork_15_first_pos_block"), Some(SPORK_15_FIRST_POS_BLOCK));
        assert_eq!(spork_id("SPORK_99_NOPE"), None);
        assert_eq!(spork_name(1), None);
    }
}
