use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::{Category, Level};

#[derive(Clone, Debug)]
pub struct CapturedLog {
    pub ts_ms: u64,
    pub level: Level,
    pub category: Option<Category>,
    pub target: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub msg: String,
}

static ENABLED: AtomicBool = AtomicBool::new(false);
static CAPACITY: AtomicUsize = AtomicUsize::new(0);
static RING: OnceLock<Mutex<VecDeque<CapturedLog>>> = OnceLock::new();

pub(crate) fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn enable_capture(capacity: usize) {
    if capacity == 0 {
        disable_capture();
        return;
    }
    CAPACITY.store(capacity, Ordering::Relaxed);
    RING.get_or_init(|| Mutex::new(VecDeque::with_capacity(capacity.min(1024))));
    ENABLED.store(true, Ordering::Relaxed);
}

pub fn disable_capture() {
    ENABLED.store(false, Ordering::Relaxed);
}

pub fn clear_captured_logs() {
    if let Some(ring) = RING.get() {
        if let Ok(mut guard) = ring.lock() {
            guard.clear();
        }
    }
}

/// Most recent `limit` captured records, oldest first.
pub fn capture_snapshot(limit: usize) -> Vec<CapturedLog> {
    let Some(ring) = RING.get() else {
        return Vec::new();
    };
    let Ok(guard) = ring.lock() else {
        return Vec::new();
    };
    let skip = guard.len().saturating_sub(limit);
    guard.iter().skip(skip).cloned().collect()
}

pub(crate) fn push(record: CapturedLog) {
    let cap = CAPACITY.load(Ordering::Relaxed);
    if cap == 0 {
        return;
    }
    let Some(ring) = RING.get() else {
        return;
    };
    let Ok(mut guard) = ring.lock() else {
        return;
    };
    guard.push_back(record);
    while guard.len() > cap {
        guard.pop_front();
    }
}
