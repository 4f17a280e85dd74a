pub mod clock;
pub mod config;
pub mod ingress;
pub mod mempool;
pub mod node;
pub mod producer;

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use hybridd_chainstate::{CheckpointTable, ConsensusRules, ReindexDriver};
use hybridd_consensus::{consensus_params, hash256_to_hex, ConsensusParams};
use hybridd_log::{log_debug, log_info, log_warn};
use hybridd_pow::Sha256dOracle;
use hybridd_spork::SporkRegistry;
use hybridd_storage::fjall::FjallStore;
use hybridd_storage::memory::MemoryStore;
use hybridd_storage::{Column, KeyValueStore, PrefixVisitor, StoreError, WriteBatch};

use crate::clock::{Clock, MockClock, SystemClock};
use crate::config::{usage, Backend, CliAction, Config};
use crate::ingress::{Ingress, NullRelay, Relay};
use crate::node::{Node, NodeOptions};

pub use crate::node::{ChainInfo, ChainSnapshot};

const DATA_DIR_LOCK_FILE_NAME: &str = ".lock";
const DB_DIR_NAME: &str = "db";

pub enum Store {
    Memory(MemoryStore),
    Fjall(FjallStore),
}

impl Store {
    /// Flushes the fjall journal; a no-op in memory.
    pub fn persist(&self) -> Result<(), StoreError> {
        match self {
            Store::Memory(_) => Ok(()),
            Store::Fjall(store) => store.persist(),
        }
    }
}

impl KeyValueStore for Store {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match self {
            Store::Memory(store) => store.get(column, key),
            Store::Fjall(store) => store.get(column, key),
        }
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        match self {
            Store::Memory(store) => store.put(column, key, value),
            Store::Fjall(store) => store.put(column, key, value),
        }
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        match self {
            Store::Memory(store) => store.delete(column, key),
            Store::Fjall(store) => store.delete(column, key),
        }
    }

    fn for_each_prefix<'a>(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'a>,
    ) -> Result<(), StoreError> {
        match self {
            Store::Memory(store) => store.for_each_prefix(column, prefix, visitor),
            Store::Fjall(store) => store.for_each_prefix(column, prefix, visitor),
        }
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        match self {
            Store::Memory(store) => store.write_batch(batch),
            Store::Fjall(store) => store.write_batch(batch),
        }
    }
}

struct DataDirLock {
    _file: File,
}

fn lock_data_dir(data_dir: &Path) -> Result<DataDirLock, String> {
    let lock_path = data_dir.join(DATA_DIR_LOCK_FILE_NAME);
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|err| format!("failed to open lock file {}: {err}", lock_path.display()))?;

    match file.try_lock_exclusive() {
        Ok(()) => {
            let _ = file.set_len(0);
            let _ = file.seek(SeekFrom::Start(0));
            let _ = writeln!(file, "pid={}", std::process::id());
            let _ = file.flush();
            Ok(DataDirLock { _file: file })
        }
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
            let mut holder = String::new();
            let _ =
                File::open(&lock_path).and_then(|mut reader| reader.read_to_string(&mut holder));
            Err(format!(
                "data dir {} is already locked by another hybridd ({})",
                data_dir.display(),
                holder.trim()
            ))
        }
        Err(err) => Err(format!(
            "failed to lock data dir {}: {err}",
            data_dir.display()
        )),
    }
}

pub fn open_store(backend: Backend, data_dir: &Path) -> Result<Store, String> {
    match backend {
        Backend::Memory => Ok(Store::Memory(MemoryStore::new())),
        Backend::Fjall => {
            let db_path = data_dir.join(DB_DIR_NAME);
            FjallStore::open(&db_path)
                .map(Store::Fjall)
                .map_err(|err| format!("failed to open {}: {err}", db_path.display()))
        }
    }
}

/// Network parameters with the operator's extra checkpoints folded in.
pub fn effective_params(config: &Config) -> ConsensusParams {
    let mut params = consensus_params(config.network);
    for checkpoint in &config.extra_checkpoints {
        params.checkpoints.retain(|existing| existing.height != checkpoint.height);
        params.checkpoints.push(*checkpoint);
    }
    params.checkpoints.sort_by_key(|checkpoint| checkpoint.height);
    params
}

/// Rebuilds the chain index from `store` and wraps it in a node.
///
/// Without `--reindex` the stored proofs are trusted; with it every proof
/// is checked again.
pub fn build_node<S: KeyValueStore>(
    config: &Config,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    relay: Arc<dyn Relay>,
) -> Result<Node<S>, String> {
    let params = effective_params(config);
    let checkpoints = CheckpointTable::new(&params.checkpoints, config.enforce_checkpoints);
    let mut registry = SporkRegistry::new(params.default_first_pos_height);
    let rules = ConsensusRules::new(params, Arc::new(Sha256dOracle));

    let mut driver = ReindexDriver::new(store, rules, checkpoints);
    if !config.reindex {
        driver = driver.trust_stored_proofs();
    }
    let (index, stats) = driver
        .rebuild(&mut registry, clock.now())
        .map_err(|err| err.to_string())?;
    if stats.rejected > 0 {
        log_warn!(
            "{} stored blocks no longer pass consensus and were left out of the index",
            stats.rejected
        );
    }

    let options = NodeOptions {
        max_orphan_blocks: config.max_orphan_blocks,
        orphan_expiry_secs: config.orphan_expiry_secs,
        ..NodeOptions::default()
    };
    Ok(Node::new(index, registry, options, clock, relay))
}

pub async fn run_entry() -> Result<(), String> {
    match config::parse_args().map_err(|err| format!("{err}\n{}", usage()))? {
        CliAction::PrintHelp => {
            println!("{}", usage());
            Ok(())
        }
        CliAction::PrintVersion => {
            println!("hybridd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliAction::Run(config) => run_with_config(config).await,
    }
}

async fn run_with_config(config: Config) -> Result<(), String> {
    hybridd_log::init(&config.log);
    log_info!(
        "Startup: backend={} network={} data_dir={} reindex={}",
        config.backend.as_str(),
        config.network.as_str(),
        config.data_dir.display(),
        config.reindex
    );
    if let Some(address) = &config.spork_address {
        log_info!("spork address {address}");
    }

    fs::create_dir_all(&config.data_dir).map_err(|err| err.to_string())?;
    let _data_dir_lock = lock_data_dir(&config.data_dir)?;
    let store = Arc::new(open_store(config.backend, &config.data_dir)?);

    let clock: Arc<dyn Clock> = match config.mocktime {
        Some(time) => {
            log_warn!("mock time enabled at {time}");
            Arc::new(MockClock::new(time))
        }
        None => Arc::new(SystemClock),
    };
    let node = Arc::new(build_node(
        &config,
        Arc::clone(&store),
        clock,
        Arc::new(NullRelay),
    )?);
    let tip = node.current_tip();
    log_info!(
        "Startup: tip {} at height {} ({})",
        hash256_to_hex(&tip.hash),
        tip.height,
        tip.mode
    );
    match serde_json::to_string(&node.chain_info()) {
        Ok(info) => log_info!("chain info {info}"),
        Err(err) => log_warn!("failed to serialize chain info: {err}"),
    }

    let ingress = Ingress::spawn(Arc::clone(&node))?;
    let mut ticker =
        tokio::time::interval(Duration::from_secs(config.maintenance_interval_secs));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log_info!("Signal received; shutting down.");
                break;
            }
            _ = ticker.tick() => {
                let report = node.tick();
                if report.tip_changed {
                    let tip = node.current_tip();
                    log_info!("tip now {} at height {}", hash256_to_hex(&tip.hash), tip.height);
                }
                if let Some(at) = report.next_checkpoint_activation {
                    log_debug!("next spork checkpoint activates at {at}");
                }
            }
        }
    }

    let stats = ingress.shutdown();
    log_info!("ingress processed {stats:?}");
    store.persist().map_err(|err| err.to_string())?;
    Ok(())
}
