//! Wakeup rate limiter
//!
//! Bounds how often a tracker may wake its readers. The policy is a pure
//! function of three timestamps; [`RateLimiter`] wraps it with the
//! update-on-success bookkeeping that concurrent signallers share.

use core::sync::atomic::{AtomicU64, Ordering};

/// Sentinel stored in `last_ts` before the first delivered signal
const NEVER: u64 = u64::MAX;

/// Decide whether a signal at `now` may be delivered.
///
/// Returns false iff `now - last_ts < interval`. A clock that went
/// backwards (`now < last_ts`) counts as being inside the window.
#[inline]
pub fn should_signal(now: u64, last_ts: u64, interval: u64) -> bool {
    if now < last_ts {
        return false;
    }
    now - last_ts >= interval
}

/// Shared rate limiter state for one notification channel.
///
/// `last_ts` only moves when a signal is actually delivered, so a burst of
/// dropped attempts never extends the suppression window.
#[derive(Debug)]
pub struct RateLimiter {
    last_ts: AtomicU64,
    interval_ns: u64,
}

impl RateLimiter {
    /// Create a limiter that has never fired
    pub const fn new(interval_ns: u64) -> Self {
        Self {
            last_ts: AtomicU64::new(NEVER),
            interval_ns,
        }
    }

    /// Minimum nanoseconds between delivered signals
    #[inline]
    pub fn interval_ns(&self) -> u64 {
        self.interval_ns
    }

    /// Timestamp of the last delivered signal, `None` before the first one
    #[inline]
    pub fn last_signal_ts(&self) -> Option<u64> {
        match self.last_ts.load(Ordering::Acquire) {
            NEVER => None,
            ts => Some(ts),
        }
    }

    /// Claim the window at `now`.
    ///
    /// Returns true if the caller may deliver a signal; the timestamp has
    /// then already been advanced to `now`. Concurrent callers serialise on
    /// the compare-exchange so at most one of them wins a given window.
    /// Never blocks.
    pub fn try_acquire(&self, now: u64) -> bool {
        let mut last = self.last_ts.load(Ordering::Acquire);
        loop {
            if last != NEVER && !should_signal(now, last, self.interval_ns) {
                return false;
            }
            match self.last_ts.compare_exchange_weak(
                last,
                now,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => last = actual,
            }
        }
    }
}
