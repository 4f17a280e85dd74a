//! Live spork state.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use hybridd_consensus::constants::{
    BLACKLIST_DISABLED_SINCE, SPORK_BLACKLIST_MAX_AGE, SPORK_CHECKPOINT_MAX_AGE,
};
use hybridd_consensus::Hash256;
use hybridd_log::{log_category, Category};

use crate::ids::{KNOWN_SPORKS, SPORK_15_FIRST_POS_BLOCK};
use crate::message::{SporkKey, SporkPayload, SporkUpdate};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SporkError {
    /// Not newer than the last update applied to the same key.
    Stale { last: i64, received: i64 },
    Malformed(&'static str),
}

impl fmt::Display for SporkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SporkError::Stale { last, received } => {
                write!(f, "stale spork: signed {received}, already have {last}")
            }
            SporkError::Malformed(reason) => write!(f, "malformed spork: {reason}"),
        }
    }
}

impl std::error::Error for SporkError {}

/// Holds every applied update so that values can be read as of any time.
///
/// Nothing here is persisted: a restart or reindex starts from the
/// compiled-in defaults again.
#[derive(Clone, Debug)]
pub struct SporkRegistry {
    defaults: BTreeMap<u32, i64>,
    /// Newest `time_signed` per key. Survives pruning so an expired update
    /// cannot be replayed.
    last_signed: HashMap<SporkKey, i64>,
    /// Applied updates per key, oldest first.
    history: BTreeMap<SporkKey, Vec<SporkUpdate>>,
}

impl SporkRegistry {
    pub fn new(default_first_pos_height: i64) -> Self {
        let mut defaults: BTreeMap<u32, i64> = KNOWN_SPORKS
            .iter()
            .map(|known| (known.id, known.default))
            .collect();
        defaults.insert(SPORK_15_FIRST_POS_BLOCK, default_first_pos_height);
        Self {
            defaults,
            last_signed: HashMap::new(),
            history: BTreeMap::new(),
        }
    }

    /// Validates and records an update. Rejected updates leave the registry
    /// untouched.
    pub fn apply(&mut self, update: SporkUpdate) -> Result<(), SporkError> {
        update.validate().map_err(SporkError::Malformed)?;
        let key = update.key();
        if let Some(last) = self.last_signed.get(&key) {
            if update.time_signed <= *last {
                log_category!(
                    Category::Spork,
                    "ignoring stale {key}: signed {} <= {last}",
                    update.time_signed
                );
                return Err(SporkError::Stale {
                    last: *last,
                    received: update.time_signed,
                });
            }
        }
        log_category!(Category::Spork, "applied {update}");
        self.last_signed.insert(key.clone(), update.time_signed);
        self.history.entry(key).or_default().push(update);
        Ok(())
    }

    /// Drops every applied update.
    pub fn reset(&mut self) {
        self.last_signed.clear();
        self.history.clear();
    }

    /// The newest update with `activation_time <= as_of`.
    fn effective(&self, key: &SporkKey, as_of: i64) -> Option<&SporkUpdate> {
        self.history
            .get(key)?
            .iter()
            .rev()
            .find(|update| update.activation_time <= as_of)
    }

    /// Numeric parameter value with consensus effect at `as_of`.
    pub fn read(&self, id: u32, as_of: i64) -> i64 {
        match self.effective(&SporkKey::Parameter(id), as_of) {
            Some(SporkUpdate {
                payload: SporkPayload::Parameter { value, .. },
                ..
            }) => *value,
            _ => self.default_value(id),
        }
    }

    /// Most recently applied value, whether or not it is active yet.
    pub fn latest(&self, id: u32) -> i64 {
        let newest = self
            .history
            .get(&SporkKey::Parameter(id))
            .and_then(|updates| updates.last());
        match newest {
            Some(SporkUpdate {
                payload: SporkPayload::Parameter { value, .. },
                ..
            }) => *value,
            _ => self.default_value(id),
        }
    }

    fn default_value(&self, id: u32) -> i64 {
        self.defaults.get(&id).copied().unwrap_or(i64::MAX)
    }

    pub fn first_pos_height(&self, as_of: i64) -> i64 {
        self.read(SPORK_15_FIRST_POS_BLOCK, as_of)
    }

    pub fn is_blacklisted(&self, script_pubkey: &[u8], as_of: i64) -> bool {
        match self.effective(&SporkKey::Blacklist(script_pubkey.to_vec()), as_of) {
            Some(SporkUpdate {
                payload: SporkPayload::Blacklist { since, .. },
                ..
            }) => *since != BLACKLIST_DISABLED_SINCE && *since <= as_of,
            _ => false,
        }
    }

    pub fn has_blacklist(&self) -> bool {
        self.history
            .keys()
            .any(|key| matches!(key, SporkKey::Blacklist(_)))
    }

    /// Applied checkpoint updates as `(height, hash, activation, signed)`.
    pub fn checkpoint_updates(&self) -> Vec<(i64, Hash256, i64, i64)> {
        self.history
            .values()
            .flatten()
            .filter_map(|update| match &update.payload {
                SporkPayload::Checkpoint { height, block_hash } => Some((
                    *height,
                    *block_hash,
                    update.activation_time,
                    update.time_signed,
                )),
                _ => None,
            })
            .collect()
    }

    /// Drops state for keys whose newest update is older than its relay
    /// age. Returns the keys removed.
    ///
    /// Checkpoint keys go entirely; their pins already live in the
    /// checkpoint table. A blacklist key is removed only once a lift is in
    /// effect. Otherwise its history is trimmed to the updates that can
    /// still decide a verdict, so the entry stays enforced.
    pub fn prune_expired(&mut self, now: i64) -> Vec<SporkKey> {
        let mut removed = Vec::new();
        for (key, updates) in self.history.iter_mut() {
            let Some(newest) = updates.last() else {
                removed.push(key.clone());
                continue;
            };
            let expired = match max_age(key) {
                Some(age) => newest.time_signed < now - age,
                None => false,
            };
            if !expired {
                continue;
            }
            match key {
                SporkKey::Blacklist(_) if !is_active_lift(newest, now) => {
                    let keep_from = updates
                        .iter()
                        .rposition(|update| update.activation_time <= now)
                        .unwrap_or(0);
                    updates.drain(..keep_from);
                }
                _ => removed.push(key.clone()),
            }
        }
        for key in &removed {
            log_category!(Category::Spork, "pruned expired {key}");
            self.history.remove(key);
        }
        removed
    }

    /// Current messages to hand a newly connected peer: the newest update
    /// per key, minus those too old to relay.
    pub fn sync_messages(&self, now: i64) -> Vec<SporkUpdate> {
        self.history
            .iter()
            .filter_map(|(key, updates)| {
                let newest = updates.last()?;
                match max_age(key) {
                    Some(age) if newest.time_signed < now - age => None,
                    _ => Some(newest.clone()),
                }
            })
            .collect()
    }

    /// `(name, latest value, active value)` for every known parameter.
    pub fn show(&self, now: i64) -> Vec<(&'static str, i64, i64)> {
        KNOWN_SPORKS
            .iter()
            .map(|known| (known.name, self.latest(known.id), self.read(known.id, now)))
            .collect()
    }
}

fn is_active_lift(update: &SporkUpdate, now: i64) -> bool {
    matches!(
        update.payload,
        SporkPayload::Blacklist { since, .. } if since == BLACKLIST_DISABLED_SINCE
    ) && update.activation_time <= now
}

fn max_age(key: &SporkKey) -> Option<i64> {
    match key {
        SporkKey::Parameter(_) => None,
        SporkKey::Checkpoint(_) => Some(SPORK_CHECKPOINT_MAX_AGE),
        SporkKey::Blacklist(_) => Some(SPORK_BLACKLIST_MAX_AGE),
    }
}
