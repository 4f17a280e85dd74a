use hybridd_consensus::constants::{
    BLACKLIST_DISABLED_SINCE, FIRST_POS_DISABLED, SPORK_BLACKLIST_MAX_AGE, SPORK_CHECKPOINT_MAX_AGE,
};
use hybridd_spork::ids::SPORK_5_INSTANTSEND_MAX_VALUE;
use hybridd_spork::{SporkError, SporkKey, SporkPayload, SporkRegistry, SporkUpdate, SPORK_15_FIRST_POS_BLOCK};

fn first_pos(value: i64, signed: i64) -> SporkUpdate {
    SporkUpdate::new(
        SporkPayload::Parameter {
            id: SPORK_15_FIRST_POS_BLOCK,
            value,
        },
        signed,
    )
}

fn blacklist(script: &[u8], since: i64, signed: i64) -> SporkUpdate {
    SporkUpdate::new(
        SporkPayload::Blacklist {
            script_pubkey: script.to_vec(),
            since,
        },
        signed,
    )
}

#[test]
fn defaults_are_inert() {
    let registry = SporkRegistry::new(FIRST_POS_DISABLED);
    assert_eq!(registry.first_pos_height(i64::MAX), FIRST_POS_DISABLED);
    assert!(!registry.is_blacklisted(&[0x51], 1_000));
    assert!(registry.checkpoint_updates().is_empty());
    assert_eq!(registry.read(SPORK_5_INSTANTSEND_MAX_VALUE, 0), 1000);
}

#[test]
fn older_update_after_newer_is_a_no_op() {
    let mut registry = SporkRegistry::new(FIRST_POS_DISABLED);
    registry.apply(first_pos(200, 100)).expect("first");
    registry.apply(first_pos(150, 110)).expect("newer");

    let stale = registry.apply(first_pos(50, 105));
    assert_eq!(
        stale,
        Err(SporkError::Stale {
            last: 110,
            received: 105
        })
    );
    let replay = registry.apply(first_pos(60, 110));
    assert!(matches!(replay, Err(SporkError::Stale { .. })));
    assert_eq!(registry.latest(SPORK_15_FIRST_POS_BLOCK), 150);
    assert_eq!(registry.first_pos_height(1_000), 150);
}

#[test]
fn value_visible_before_it_is_effective() {
    let mut registry = SporkRegistry::new(FIRST_POS_DISABLED);
    registry
        .apply(first_pos(103, 100).with_activation(130))
        .expect("apply");
    assert_eq!(registry.latest(SPORK_15_FIRST_POS_BLOCK), 103);
    assert_eq!(registry.first_pos_height(129), FIRST_POS_DISABLED);
    assert_eq!(registry.first_pos_height(130), 103);
}

#[test]
fn as_of_queries_see_history() {
    let mut registry = SporkRegistry::new(FIRST_POS_DISABLED);
    registry.apply(first_pos(300, 100)).expect("first");
    registry.apply(first_pos(200, 200)).expect("second");
    assert_eq!(registry.first_pos_height(99), FIRST_POS_DISABLED);
    assert_eq!(registry.first_pos_height(150), 300);
    assert_eq!(registry.first_pos_height(250), 200);
}

#[test]
fn keys_are_independent() {
    let mut registry = SporkRegistry::new(FIRST_POS_DISABLED);
    let cp = |height, signed| {
        SporkUpdate::new(
            SporkPayload::Checkpoint {
                height,
                block_hash: [height as u8; 32],
            },
            signed,
        )
    };
    registry.apply(cp(7, 100)).expect("cp7");
    // Older signing time but a different height is a different key.
    registry.apply(cp(8, 90)).expect("cp8");
    assert!(matches!(registry.apply(cp(7, 95)), Err(SporkError::Stale { .. })));
    assert_eq!(registry.checkpoint_updates().len(), 2);
}

#[test]
fn malformed_updates_do_not_change_state() {
    let mut registry = SporkRegistry::new(FIRST_POS_DISABLED);
    let bad = SporkUpdate::new(
        SporkPayload::Checkpoint {
            height: 5,
            block_hash: [0u8; 32],
        },
        100,
    );
    assert!(matches!(registry.apply(bad), Err(SporkError::Malformed(_))));
    assert!(registry.checkpoint_updates().is_empty());
    assert!(registry.sync_messages(100).is_empty());
}

#[test]
fn blacklist_gating_follows_activation() {
    let mut registry = SporkRegistry::new(FIRST_POS_DISABLED);
    let script = [0xa9, 0x14, 0x01];
    registry.apply(blacklist(&script, 1_000, 900)).expect("add");
    assert!(!registry.is_blacklisted(&script, 999));
    assert!(registry.is_blacklisted(&script, 1_000));

    registry
        .apply(blacklist(&script, BLACKLIST_DISABLED_SINCE, 2_000))
        .expect("lift");
    assert!(registry.is_blacklisted(&script, 1_999));
    assert!(!registry.is_blacklisted(&script, 2_000));
    assert!(!registry.is_blacklisted(&[0x51], 1_500));
}

#[test]
fn reset_restores_defaults() {
    let mut registry = SporkRegistry::new(FIRST_POS_DISABLED);
    registry.apply(first_pos(103, 100)).expect("apply");
    registry.reset();
    assert_eq!(registry.first_pos_height(i64::MAX), FIRST_POS_DISABLED);
    // Reset forgets ordering too; an operator may reissue.
    registry.apply(first_pos(103, 50)).expect("reissue");
}

#[test]
fn old_checkpoints_are_pruned_but_not_replayable() {
    let mut registry = SporkRegistry::new(FIRST_POS_DISABLED);
    let update = SporkUpdate::new(
        SporkPayload::Checkpoint {
            height: 4,
            block_hash: [4u8; 32],
        },
        1_000,
    );
    registry.apply(update.clone()).expect("apply");
    registry.apply(first_pos(103, 1_000)).expect("param");

    let now = 1_000 + SPORK_CHECKPOINT_MAX_AGE + 1;
    assert_eq!(registry.sync_messages(now).len(), 1);
    assert_eq!(registry.prune_expired(now), vec![SporkKey::Checkpoint(4)]);
    assert!(registry.checkpoint_updates().is_empty());
    assert!(matches!(registry.apply(update), Err(SporkError::Stale { .. })));
    assert_eq!(registry.first_pos_height(now), 103);
}

#[test]
fn pruned_blacklist_stays_enforced() {
    let mut registry = SporkRegistry::new(FIRST_POS_DISABLED);
    let script = [0x76, 0xa9, 0x14, 0x09, 0x09];
    registry.apply(blacklist(&script, 1_000, 900)).expect("first");
    registry.apply(blacklist(&script, 1_000, 1_000)).expect("reissue");

    let now = 1_000 + SPORK_BLACKLIST_MAX_AGE + 1;
    assert!(registry.sync_messages(now).is_empty());
    assert!(registry.prune_expired(now).is_empty());
    assert!(registry.is_blacklisted(&script, now));
    assert!(registry.has_blacklist());
    assert!(matches!(
        registry.apply(blacklist(&script, 1_000, 1_000)),
        Err(SporkError::Stale { .. })
    ));

    // Only a lift ends it; once that lift ages out the key is dropped.
    registry
        .apply(blacklist(&script, BLACKLIST_DISABLED_SINCE, now))
        .expect("lift");
    assert!(!registry.is_blacklisted(&script, now));
    let later = now + SPORK_BLACKLIST_MAX_AGE + 1;
    assert_eq!(
        registry.prune_expired(later),
        vec![SporkKey::Blacklist(script.to_vec())]
    );
    assert!(!registry.has_blacklist());
    assert!(!registry.is_blacklisted(&script, later));
}

#[test]
fn show_lists_known_parameters() {
    let mut registry = SporkRegistry::new(FIRST_POS_DISABLED);
    registry
        .apply(first_pos(103, 100).with_activation(500))
        .expect("apply");
    let shown = registry.show(200);
    let entry = shown
        .iter()
        .find(|(name, _, _)| *name == "SPORK_15_FIRST_POS_BLOCK")
        .expect("listed");
    assert_eq!((entry.1, entry.2), (103, FIRST_POS_DISABLED));
}

#[test]
fn stale_update_is_logged_under_spork_category() {
    hybridd_log::set_stderr_enabled(false);
    hybridd_log::enable_category(hybridd_log::Category::Spork);
    hybridd_log::enable_capture(256);

    let mut registry = SporkRegistry::new(FIRST_POS_DISABLED);
    registry.apply(first_pos(77, 900)).expect("first");
    assert!(registry.apply(first_pos(78, 900)).is_err());

    let logged = hybridd_log::capture_snapshot(256);
    assert!(logged.iter().any(|record| {
        record.category == Some(hybridd_log::Category::Spork)
            && record.msg.contains("ignoring stale")
            && record.msg.contains("900")
    }));
}
