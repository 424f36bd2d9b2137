//! Monotonic clock abstraction
//!
//! The notification channel only needs a 64-bit nanosecond timestamp that
//! never goes backwards. The OS-backed implementation lives in the runtime
//! crate; [`ManualClock`] is driven by hand.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of monotonic nanosecond timestamps
pub trait Clock: Send + Sync {
    /// Current time in nanoseconds since an arbitrary fixed origin
    fn now_ns(&self) -> u64;
}

/// Clock whose time only changes when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ns: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ns),
        }
    }

    pub fn set(&self, ns: u64) {
        self.now.store(ns, Ordering::SeqCst);
    }

    /// Move the clock forward and return the new time
    pub fn advance(&self, delta_ns: u64) -> u64 {
        self.now.fetch_add(delta_ns, Ordering::SeqCst) + delta_ns
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
