mod common;

use std::sync::Arc;

use common::{genesis_time, regtest_config, BLOCK_SPACING};
use hybridd::clock::MockClock;
use hybridd::config::{Backend, Config};
use hybridd::ingress::NullRelay;
use hybridd::producer::RegtestProducer;
use hybridd::{build_node, open_store, ChainSnapshot};

fn fjall_config(dir: &std::path::Path, reindex: bool) -> Config {
    Config {
        backend: Backend::Fjall,
        data_dir: dir.to_path_buf(),
        reindex,
        ..regtest_config()
    }
}

fn open_tip(config: &Config, clock: &MockClock) -> Arc<ChainSnapshot> {
    let store = Arc::new(open_store(config.backend, &config.data_dir).expect("store opens"));
    let node = build_node(config, store, Arc::new(clock.clone()), Arc::new(NullRelay))
        .expect("node builds");
    node.current_tip()
}

#[test]
fn chain_survives_restart_and_reindex() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = MockClock::new(genesis_time() + 1_000);
    let config = fjall_config(dir.path(), false);

    let mined = {
        let store = Arc::new(open_store(config.backend, &config.data_dir).expect("store opens"));
        let node = build_node(
            &config,
            Arc::clone(&store),
            Arc::new(clock.clone()),
            Arc::new(NullRelay),
        )
        .expect("node builds");
        let mut producer = RegtestProducer::new(common::p2pkh(3));
        for _ in 0..4 {
            clock.advance(BLOCK_SPACING);
            node.generate(&mut producer, 1, None).expect("generated");
        }
        store.persist().expect("persist");
        node.current_tip()
    };
    assert_eq!(mined.height, 4);

    clock.advance(BLOCK_SPACING);
    assert_eq!(open_tip(&config, &clock), mined);
    assert_eq!(open_tip(&fjall_config(dir.path(), true), &clock), mined);
}
