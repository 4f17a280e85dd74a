//! Wall clock and a settable mock for tests and `--mocktime`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Unix seconds.
    fn now(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Clones share the same time, so several nodes can be stepped together.
#[derive(Clone, Debug)]
pub struct MockClock {
    time: Arc<AtomicI64>,
}

impl MockClock {
    pub fn new(start: i64) -> Self {
        Self {
            time: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, time: i64) {
        self.time.store(time, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) -> i64 {
        self.time.fetch_add(secs, Ordering::SeqCst) + secs
    }
}

impl Clock for MockClock {
    fn now(&self) -> i64 {
        self.time.load(Ordering::SeqCst)
    }
}
