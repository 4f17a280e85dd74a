//! Height pins that veto candidate chains.
//!
//! Static pins come from configuration and are always active. Spork pins are
//! installed at runtime, take effect at their activation time, and replace a
//! static pin at the same height while active. Pins at different heights are
//! enforced together.

use std::collections::BTreeMap;

use hybridd_consensus::{Checkpoint, Hash256};
use hybridd_spork::SporkRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointSource {
    Static,
    Spork,
}

impl CheckpointSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointSource::Static => "static",
            CheckpointSource::Spork => "spork",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointEntry {
    pub height: i64,
    pub hash: Hash256,
    pub source: CheckpointSource,
    pub activation_time: i64,
    pub active: bool,
}

#[derive(Clone, Copy, Debug)]
struct SporkPin {
    hash: Hash256,
    activation_time: i64,
    time_signed: i64,
}

#[derive(Clone, Debug)]
pub struct CheckpointTable {
    statics: BTreeMap<i64, Hash256>,
    /// Per height, ordered by signing time.
    sporked: BTreeMap<i64, Vec<SporkPin>>,
    enforce: bool,
}

impl CheckpointTable {
    pub fn new(statics: &[Checkpoint], enforce: bool) -> Self {
        Self {
            statics: statics
                .iter()
                .map(|checkpoint| (checkpoint.height, checkpoint.hash))
                .collect(),
            sporked: BTreeMap::new(),
            enforce,
        }
    }

    pub fn is_enforced(&self) -> bool {
        self.enforce
    }

    pub fn set_enforced(&mut self, enforce: bool) {
        self.enforce = enforce;
    }

    pub fn add_static(&mut self, height: i64, hash: Hash256) {
        self.statics.insert(height, hash);
    }

    pub fn add_spork(&mut self, height: i64, hash: Hash256, activation_time: i64, time_signed: i64) {
        let pins = self.sporked.entry(height).or_default();
        let at = pins.partition_point(|pin| pin.time_signed <= time_signed);
        pins.insert(
            at,
            SporkPin {
                hash,
                activation_time,
                time_signed,
            },
        );
    }

    pub fn clear_sporks(&mut self) {
        self.sporked.clear();
    }

    /// Replaces every spork pin with the registry's current checkpoint set.
    pub fn sync_sporks(&mut self, registry: &SporkRegistry) {
        self.clear_sporks();
        for (height, hash, activation_time, time_signed) in registry.checkpoint_updates() {
            self.add_spork(height, hash, activation_time, time_signed);
        }
    }

    fn spork_at(&self, height: i64, now: i64) -> Option<&SporkPin> {
        self.sporked
            .get(&height)?
            .iter()
            .rev()
            .find(|pin| pin.activation_time <= now)
    }

    /// The block id required at `height`, if any pin there is active.
    pub fn expected_at(&self, height: i64, now: i64) -> Option<Hash256> {
        match self.spork_at(height, now) {
            Some(pin) => Some(pin.hash),
            None => self.statics.get(&height).copied(),
        }
    }

    /// Active pins in height order, ignoring the enforcement switch.
    pub fn active(&self, now: i64) -> Vec<(i64, Hash256)> {
        let mut heights: Vec<i64> = self
            .statics
            .keys()
            .chain(self.sporked.keys())
            .copied()
            .collect();
        heights.sort_unstable();
        heights.dedup();
        heights
            .into_iter()
            .filter_map(|height| self.expected_at(height, now).map(|hash| (height, hash)))
            .collect()
    }

    /// Whether a chain ending at `tip_height` agrees with every active pin at
    /// or below that height. `hash_at` resolves the chain's block at a height.
    pub fn is_satisfied<F>(&self, now: i64, tip_height: i64, hash_at: F) -> bool
    where
        F: Fn(i64) -> Option<Hash256>,
    {
        if !self.enforce {
            return true;
        }
        self.active(now)
            .into_iter()
            .take_while(|(height, _)| *height <= tip_height)
            .all(|(height, expected)| hash_at(height) == Some(expected))
    }

    /// Earliest spork pin activation strictly after `now`.
    pub fn next_activation(&self, now: i64) -> Option<i64> {
        self.sporked
            .values()
            .flatten()
            .map(|pin| pin.activation_time)
            .filter(|activation| *activation > now)
            .min()
    }

    /// Every static pin plus the newest spork pin per height.
    pub fn list(&self, now: i64) -> Vec<CheckpointEntry> {
        let mut entries = Vec::new();
        for (height, hash) in &self.statics {
            let overridden = self.spork_at(*height, now).is_some();
            entries.push(CheckpointEntry {
                height: *height,
                hash: *hash,
                source: CheckpointSource::Static,
                activation_time: 0,
                active: !overridden,
            });
        }
        for (height, pins) in &self.sporked {
            let Some(newest) = pins.last() else {
                continue;
            };
            let effective = self.spork_at(*height, now);
            entries.push(CheckpointEntry {
                height: *height,
                hash: newest.hash,
                source: CheckpointSource::Spork,
                activation_time: newest.activation_time,
                active: effective.is_some_and(|pin| pin.time_signed == newest.time_signed),
            });
        }
        entries.sort_by_key(|entry| entry.height);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridd_spork::{SporkPayload, SporkUpdate};

    fn chain(len: i64) -> impl Fn(i64) -> Option<Hash256> {
        move |height| (height < len).then(|| [height as u8; 32])
    }

    #[test]
    fn static_pin_vetoes_mismatch() {
        let table = CheckpointTable::new(
            &[Checkpoint {
                height: 3,
                hash: [9u8; 32],
            }],
            true,
        );
        assert!(table.is_satisfied(0, 2, chain(3)));
        assert!(!table.is_satisfied(0, 3, chain(4)));
    }

    #[test]
    fn disabled_table_accepts_everything() {
        let table = CheckpointTable::new(
            &[Checkpoint {
                height: 3,
                hash: [9u8; 32],
            }],
            false,
        );
        assert!(table.is_satisfied(0, 10, chain(11)));
    }

    #[test]
    fn spork_pin_overrides_static_once_active() {
        let mut table = CheckpointTable::new(
            &[Checkpoint {
                height: 3,
                hash: [9u8; 32],
            }],
            true,
        );
        table.add_spork(3, [3u8; 32], 100, 90);
        assert!(!table.is_satisfied(99, 5, chain(6)));
        assert!(table.is_satisfied(100, 5, chain(6)));
        assert_eq!(table.next_activation(50), Some(100));
        assert_eq!(table.next_activation(100), None);

        let listed = table.list(100);
        assert_eq!(listed.len(), 2);
        assert!(!listed[0].active);
        assert_eq!(listed[1].source, CheckpointSource::Spork);
        assert!(listed[1].active);
    }

    #[test]
    fn newer_spork_pin_supersedes() {
        let mut table = CheckpointTable::new(&[], true);
        table.add_spork(4, [0xee; 32], 10, 10);
        table.add_spork(4, [4u8; 32], 20, 20);
        assert!(!table.is_satisfied(15, 4, chain(5)));
        assert!(table.is_satisfied(20, 4, chain(5)));
    }

    #[test]
    fn sync_mirrors_registry() {
        let mut registry = SporkRegistry::new(i64::MAX);
        registry
            .apply(SporkUpdate::new(
                SporkPayload::Checkpoint {
                    height: 2,
                    block_hash: [7u8; 32],
                },
                50,
            ))
            .expect("apply");
        let mut table = CheckpointTable::new(&[], true);
        table.add_spork(8, [8u8; 32], 0, 1);
        table.sync_sporks(&registry);
        assert_eq!(table.active(50), vec![(2, [7u8; 32])]);
    }
}
