//! Live-tunable tracker parameters
//!
//! `threshold` and `timeout` are read by detection logic on every
//! evaluation and written by control-plane clients at any time. Each field
//! is an independent atomic; there is no transaction across the pair.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Threshold and timeout of one tracker, in nanoseconds
#[derive(Debug)]
pub struct TrackerParams {
    threshold: Arc<AtomicU64>,
    timeout: Arc<AtomicU64>,
}

impl TrackerParams {
    pub fn new(threshold_ns: u64, timeout_ns: u64) -> Self {
        Self {
            threshold: Arc::new(AtomicU64::new(threshold_ns)),
            timeout: Arc::new(AtomicU64::new(timeout_ns)),
        }
    }

    #[inline]
    pub fn threshold(&self) -> u64 {
        self.threshold.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_threshold(&self, ns: u64) {
        self.threshold.store(ns, Ordering::Relaxed);
    }

    #[inline]
    pub fn timeout(&self) -> u64 {
        self.timeout.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_timeout(&self, ns: u64) {
        self.timeout.store(ns, Ordering::Relaxed);
    }

    /// Shared cell backing `threshold`, handed to the namespace node
    pub fn threshold_cell(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.threshold)
    }

    /// Shared cell backing `timeout`, handed to the namespace node
    pub fn timeout_cell(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.timeout)
    }

    /// Whether a measured delay crosses the current threshold
    #[inline]
    pub fn exceeds_threshold(&self, delay_ns: u64) -> bool {
        delay_ns > self.threshold()
    }
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_share_storage() {
        let params = TrackerParams::new(10, 20);
        let cell = params.threshold_cell();

        cell.store(1_000_000, Ordering::Relaxed);
        assert_eq!(params.threshold(), 1_000_000);
        assert_eq!(params.timeout(), 20);

        params.set_timeout(7);
        assert_eq!(params.timeout_cell().load(Ordering::Relaxed), 7);
    }

    #[test]
    fn test_exceeds_threshold() {
        let params = TrackerParams::new(1_000, 0);
        assert!(!params.exceeds_threshold(1_000));
        assert!(params.exceeds_threshold(1_001));
    }
}
