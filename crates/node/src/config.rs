//! Command line and `hybridd.conf` handling.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use hybridd_consensus::constants::{DEFAULT_MAX_ORPHAN_BLOCKS, DEFAULT_ORPHAN_EXPIRY_SECS};
use hybridd_consensus::{hash256_from_hex, Checkpoint, Network};
use hybridd_log::{Category, Format, Level, LogConfig};

pub const CONF_FILE_NAME: &str = "hybridd.conf";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 10;

/// Keys that may be given more than once; every value is kept.
const REPEATABLE_KEYS: [&str; 2] = ["addcheckpoint", "debug"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Backend {
    Memory,
    Fjall,
}

impl Backend {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "memory" => Some(Self::Memory),
            "fjall" => Some(Self::Fjall),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Fjall => "fjall",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub network: Network,
    pub data_dir: PathBuf,
    pub conf_path: PathBuf,
    pub backend: Backend,
    pub reindex: bool,
    pub enforce_checkpoints: bool,
    /// Operator pins added on top of the network's compiled-in set.
    pub extra_checkpoints: Vec<Checkpoint>,
    pub log: LogConfig,
    pub mocktime: Option<i64>,
    pub max_orphan_blocks: usize,
    pub orphan_expiry_secs: i64,
    pub maintenance_interval_secs: u64,
    /// Informational; signatures are checked before updates reach the node.
    pub spork_address: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        Self {
            network: Network::Mainnet,
            conf_path: data_dir.join(CONF_FILE_NAME),
            data_dir,
            backend: Backend::Fjall,
            reindex: false,
            enforce_checkpoints: true,
            extra_checkpoints: Vec::new(),
            log: LogConfig::default(),
            mocktime: None,
            max_orphan_blocks: DEFAULT_MAX_ORPHAN_BLOCKS,
            orphan_expiry_secs: DEFAULT_ORPHAN_EXPIRY_SECS,
            maintenance_interval_secs: DEFAULT_MAINTENANCE_INTERVAL_SECS,
            spork_address: None,
        }
    }
}

pub enum CliAction {
    Run(Config),
    PrintHelp,
    PrintVersion,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    MissingValue(String),
    UnknownKey { key: String, source: String },
    InvalidValue {
        key: String,
        value: String,
        source: String,
    },
    Io(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingValue(flag) => write!(f, "missing value for --{flag}"),
            ConfigError::UnknownKey { key, source } => write!(f, "unknown option '{key}' in {source}"),
            ConfigError::InvalidValue { key, value, source } => {
                write!(f, "invalid {key} '{value}' in {source}")
            }
            ConfigError::Io(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for ConfigError {}

pub fn usage() -> String {
    [
        "Usage: hybridd [OPTIONS]",
        "",
        "Options (also accepted as key=value lines in hybridd.conf):",
        "  --network <mainnet|testnet|regtest>",
        "  --datadir <path>           Data directory (default ./data)",
        "  --conf <path>              Config file (default <datadir>/hybridd.conf)",
        "  --backend <fjall|memory>   Block store backend",
        "  --reindex                  Rebuild the index and re-check every stored proof",
        "  --checkpoints <0|1>        Enforce checkpoints (default 1)",
        "  --addcheckpoint <h>:<hash> Extra static checkpoint (repeatable)",
        "  --loglevel <level>         error|warn|info|debug|trace",
        "  --logformat <text|json>",
        "  --logtimestamps <0|1>",
        "  --debug <category>         spork|stake|checkpoint|net|reindex|mempool|all (repeatable)",
        "  --mocktime <unix secs>     Freeze the node clock",
        "  --maxorphanblocks <n>      Pending block capacity (default 750)",
        "  --orphanexpiry <secs>      Pending block lifetime (default 1200)",
        "  --maintenanceinterval <secs>",
        "  --sporkaddr <address>      Spork signing address (informational)",
        "  --help | --version",
    ]
    .join("\n")
}

/// One option occurrence and where it came from.
#[derive(Clone, Debug)]
struct Setting {
    value: String,
    source: String,
}

pub fn parse_args() -> Result<CliAction, ConfigError> {
    parse_args_from(std::env::args().skip(1))
}

pub fn parse_args_from<I>(raw_args: I) -> Result<CliAction, ConfigError>
where
    I: IntoIterator<Item = String>,
{
    let mut cli: HashMap<String, Vec<Setting>> = HashMap::new();
    let mut args = raw_args.into_iter().peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "help" | "--help" | "-h" => return Ok(CliAction::PrintHelp),
            "version" | "--version" => return Ok(CliAction::PrintVersion),
            _ => {}
        }
        let Some(flag) = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-')) else {
            return Err(ConfigError::UnknownKey {
                key: arg,
                source: "command line".to_string(),
            });
        };
        let (key, value) = match flag.split_once('=') {
            Some((key, value)) => (key.to_ascii_lowercase(), value.to_string()),
            None => {
                let key = flag.to_ascii_lowercase();
                if is_switch(&key) && !next_is_value(args.peek()) {
                    (key, "1".to_string())
                } else {
                    let value = args
                        .next()
                        .ok_or_else(|| ConfigError::MissingValue(key.clone()))?;
                    (key, value)
                }
            }
        };
        cli.entry(key).or_default().push(Setting {
            value,
            source: "command line".to_string(),
        });
    }

    let mut config = Config::default();
    if let Some(dir) = last(&cli, "datadir") {
        config.data_dir = PathBuf::from(&dir.value);
    }
    config.conf_path = match last(&cli, "conf") {
        Some(path) => PathBuf::from(&path.value),
        None => config.data_dir.join(CONF_FILE_NAME),
    };

    let mut merged = cli;
    if let Some(conf) = load_conf(&config.conf_path)? {
        for (key, settings) in conf {
            // Command line wins key by key, repeatable keys included.
            merged.entry(key).or_insert(settings);
        }
    }
    apply_settings(&mut config, &merged)?;
    Ok(CliAction::Run(config))
}

fn is_switch(key: &str) -> bool {
    matches!(key, "reindex" | "checkpoints" | "logtimestamps")
}

fn next_is_value(next: Option<&String>) -> bool {
    next.is_some_and(|value| parse_bool(value).is_some())
}

fn last<'a>(settings: &'a HashMap<String, Vec<Setting>>, key: &str) -> Option<&'a Setting> {
    settings.get(key).and_then(|values| values.last())
}

fn load_conf(path: &Path) -> Result<Option<HashMap<String, Vec<Setting>>>, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(ConfigError::Io(format!(
                "failed to read {}: {err}",
                path.display()
            )))
        }
    };
    Ok(Some(parse_conf(&contents, &path.display().to_string())))
}

fn parse_conf(contents: &str, source: &str) -> HashMap<String, Vec<Setting>> {
    let mut out: HashMap<String, Vec<Setting>> = HashMap::new();
    for raw_line in contents.lines() {
        let mut line = raw_line.trim();
        if let Some(idx) = line.find(['#', ';']) {
            line = &line[..idx];
        }
        line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (line, "1"),
        };
        if key.is_empty() {
            continue;
        }
        out.entry(key.to_ascii_lowercase())
            .or_default()
            .push(Setting {
                value: value.to_string(),
                source: source.to_string(),
            });
    }
    out
}

fn apply_settings(
    config: &mut Config,
    settings: &HashMap<String, Vec<Setting>>,
) -> Result<(), ConfigError> {
    let mut keys: Vec<&String> = settings.keys().collect();
    keys.sort();
    for key in keys {
        let Some(values) = settings.get(key) else {
            continue;
        };
        let repeatable = REPEATABLE_KEYS.contains(&key.as_str());
        let chosen: Vec<&Setting> = if repeatable {
            values.iter().collect()
        } else {
            values.last().into_iter().collect()
        };
        for setting in chosen {
            apply_one(config, key, setting)?;
        }
    }
    Ok(())
}

fn apply_one(config: &mut Config, key: &str, setting: &Setting) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        value: setting.value.clone(),
        source: setting.source.clone(),
    };
    let value = setting.value.trim();
    match key {
        "datadir" | "conf" => {}
        "network" => config.network = Network::parse(value).ok_or_else(invalid)?,
        "regtest" => {
            if parse_bool(value).ok_or_else(invalid)? {
                config.network = Network::Regtest;
            }
        }
        "testnet" => {
            if parse_bool(value).ok_or_else(invalid)? {
                config.network = Network::Testnet;
            }
        }
        "backend" => config.backend = Backend::parse(value).ok_or_else(invalid)?,
        "reindex" => config.reindex = parse_bool(value).ok_or_else(invalid)?,
        "checkpoints" => config.enforce_checkpoints = parse_bool(value).ok_or_else(invalid)?,
        "addcheckpoint" => {
            let checkpoint = parse_checkpoint(value).ok_or_else(invalid)?;
            config.extra_checkpoints.push(checkpoint);
        }
        "loglevel" => config.log.level = Level::parse(value).ok_or_else(invalid)?,
        "logformat" => config.log.format = Format::parse(value).ok_or_else(invalid)?,
        "logtimestamps" => config.log.timestamps = parse_bool(value).ok_or_else(invalid)?,
        "debug" => {
            for category in Category::parse_list(value).ok_or_else(invalid)? {
                if !config.log.categories.contains(&category) {
                    config.log.categories.push(category);
                }
            }
        }
        "mocktime" => {
            let time = value.parse::<i64>().map_err(|_| invalid())?;
            // Zero turns mock time off, as with `setmocktime 0`.
            config.mocktime = (time > 0).then_some(time);
        }
        "maxorphanblocks" => {
            config.max_orphan_blocks = value.parse::<usize>().map_err(|_| invalid())?;
        }
        "orphanexpiry" => {
            config.orphan_expiry_secs = value
                .parse::<i64>()
                .ok()
                .filter(|secs| *secs >= 0)
                .ok_or_else(invalid)?;
        }
        "maintenanceinterval" => {
            config.maintenance_interval_secs = value
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(invalid)?;
        }
        "sporkaddr" => config.spork_address = Some(value.to_string()),
        _ => {
            return Err(ConfigError::UnknownKey {
                key: key.to_string(),
                source: setting.source.clone(),
            })
        }
    }
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.is_empty() {
        return Some(true);
    }
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_checkpoint(value: &str) -> Option<Checkpoint> {
    let (height, hash) = value.split_once(':')?;
    let height = height.trim().parse::<i64>().ok().filter(|h| *h >= 0)?;
    let hash = hash256_from_hex(hash.trim()).ok()?;
    Some(Checkpoint { height, hash })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: &[&str]) -> Result<Config, ConfigError> {
        match parse_args_from(args.iter().map(|arg| arg.to_string()))? {
            CliAction::Run(config) => Ok(config),
            _ => panic!("expected a run action"),
        }
    }

    fn temp_args(dir: &Path, extra: &[&str]) -> Vec<String> {
        let mut args = vec![format!("--datadir={}", dir.display())];
        args.extend(extra.iter().map(|arg| arg.to_string()));
        args
    }

    #[test]
    fn defaults_without_conf() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = match parse_args_from(temp_args(dir.path(), &[])).expect("parse") {
            CliAction::Run(config) => config,
            _ => panic!("expected run"),
        };
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.backend, Backend::Fjall);
        assert!(config.enforce_checkpoints);
        assert_eq!(config.max_orphan_blocks, DEFAULT_MAX_ORPHAN_BLOCKS);
        assert_eq!(config.conf_path, dir.path().join(CONF_FILE_NAME));
    }

    #[test]
    fn command_line_overrides_conf() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join(CONF_FILE_NAME),
            "# governance node\nnetwork=testnet\nbackend=memory ; inline\ndebug=spork\n\
             addcheckpoint=5:0000000000000000000000000000000000000000000000000000000000000005\n\
             addcheckpoint=9:0000000000000000000000000000000000000000000000000000000000000009\n",
        )
        .expect("write conf");
        let args = temp_args(dir.path(), &["--network", "regtest", "--debug=stake", "--reindex"]);
        let config = match parse_args_from(args).expect("parse") {
            CliAction::Run(config) => config,
            _ => panic!("expected run"),
        };
        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.backend, Backend::Memory);
        assert!(config.reindex);
        assert_eq!(config.log.categories, vec![Category::Stake]);
        let heights: Vec<i64> = config.extra_checkpoints.iter().map(|cp| cp.height).collect();
        assert_eq!(heights, vec![5, 9]);
    }

    #[test]
    fn errors_name_key_and_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(CONF_FILE_NAME), "orphanexpiry=soon\n").expect("write conf");
        let err = parse_args_from(temp_args(dir.path(), &[])).err().expect("error");
        let message = err.to_string();
        assert!(message.contains("orphanexpiry"));
        assert!(message.contains(CONF_FILE_NAME));

        assert_eq!(
            run(&["--backend"]).err(),
            Some(ConfigError::MissingValue("backend".to_string()))
        );
        assert!(matches!(
            run(&["--bogus=1"]),
            Err(ConfigError::UnknownKey { .. })
        ));
    }

    #[test]
    fn switches_take_optional_values() {
        let config = run(&["--conf=/nonexistent/hybridd.conf", "--checkpoints", "0", "--reindex"])
            .expect("parse");
        assert!(!config.enforce_checkpoints);
        assert!(config.reindex);
        let config = run(&["--conf=/nonexistent/hybridd.conf", "--mocktime=1700000000"]).expect("parse");
        assert_eq!(config.mocktime, Some(1_700_000_000));
    }

    #[test]
    fn checkpoint_syntax() {
        assert!(parse_checkpoint("10:00").is_none());
        assert!(parse_checkpoint("-1:0000000000000000000000000000000000000000000000000000000000000001").is_none());
        let checkpoint =
            parse_checkpoint("10:0000000000000000000000000000000000000000000000000000000000000001")
                .expect("checkpoint");
        assert_eq!(checkpoint.height, 10);
    }
}
