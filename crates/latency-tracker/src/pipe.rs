//! Wakeup pipe
//!
//! A per-tracker notification endpoint. Readers block in
//! [`ReaderHandle::wait_for_alert`] until the tracker signals; signals are
//! rate limited, and the actual release of readers happens on the workqueue
//! thread so that [`WakeupPipe::signal`] stays safe to call from contexts
//! that may not block.
//!
//! # Semantics
//!
//! Broadcast with a single flag. Every reader blocked when the wake unit
//! runs is released; exactly one of them observes (and clears) the alert
//! flag. Signals arriving while the wake unit is still queued are
//! coalesced into it; a signal arriving while it runs buys one more
//! episode. Readers never receive payload: a completed read returns zero
//! bytes.
//!
//! ```text
//! signal(now) ─► rate limiter ─► readers > 0 ─► DeferredWork::schedule()
//!                                                     │ (workqueue thread)
//!                                                     ▼
//!                          alert_pending = true, episode += 1, wake_all()
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use latency_tracker_core::error::{TrackerError, TrackerResult};
use latency_tracker_core::RateLimiter;
use latency_tracker_runtime::{DeferredWork, PlatformWaitQueue, WaitQueue, WorkState, Workqueue};
use log::debug;

/// Result of one blocking wait on a pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A wake episode released this reader. `observed` is true for the one
    /// reader that consumed the alert flag.
    Alert { observed: bool },
    /// The reader was interrupted before an alert arrived
    Interrupted,
    /// The pipe was torn down
    Closed,
    /// The timeout elapsed first
    TimedOut,
}

/// What [`WakeupPipe::signal`] did with a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The wake unit was queued
    Delivered,
    /// A wake was already pending; this signal folded into it
    Coalesced,
    /// Inside the rate-limit window
    RateLimited,
    /// Nobody has the pipe open; the window is still consumed
    NoReaders,
    /// The pipe has been torn down
    Closed,
}

/// Counters, each a monotonically increasing total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WakeupPipeStats {
    pub delivered: u64,
    pub coalesced: u64,
    pub rate_limited: u64,
    pub no_readers: u64,
    /// Wake episodes actually run on the workqueue
    pub wakes: u64,
}

/// State shared between the pipe, its wake unit and reader interrupters
struct Alert {
    pending: AtomicBool,
    episodes: AtomicU64,
    closed: AtomicBool,
    queue: PlatformWaitQueue,
}

impl Alert {
    fn fire(&self) {
        self.pending.store(true, Ordering::SeqCst);
        self.episodes.fetch_add(1, Ordering::SeqCst);
        self.queue.wake_all();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.queue.wake_all();
    }
}

/// Rate-limited, broadcast wakeup endpoint for one tracker
pub struct WakeupPipe {
    name: String,
    alert: Arc<Alert>,
    readers: AtomicUsize,
    limiter: RateLimiter,
    work: Arc<DeferredWork>,
    torn_down: AtomicBool,

    delivered: AtomicU64,
    coalesced: AtomicU64,
    rate_limited: AtomicU64,
    no_readers: AtomicU64,
}

impl WakeupPipe {
    /// Create a pipe whose wake unit runs on `workqueue`
    pub fn new(workqueue: &Workqueue, name: impl Into<String>, interval_ns: u64) -> Arc<Self> {
        Self::with_hook(workqueue, name, interval_ns, || {})
    }

    /// Like [`WakeupPipe::new`], with `hook` run on the workqueue thread
    /// right before each wake episode.
    pub(crate) fn with_hook<H>(
        workqueue: &Workqueue,
        name: impl Into<String>,
        interval_ns: u64,
        hook: H,
    ) -> Arc<Self>
    where
        H: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        let alert = Arc::new(Alert {
            pending: AtomicBool::new(false),
            episodes: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            queue: PlatformWaitQueue::new(),
        });

        let wake = Arc::clone(&alert);
        let work = DeferredWork::new(workqueue, format!("{}/wake", name), move || {
            hook();
            wake.fire();
        });

        Arc::new(Self {
            name,
            alert,
            readers: AtomicUsize::new(0),
            limiter: RateLimiter::new(interval_ns),
            work,
            torn_down: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            no_readers: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a reader handle. Opening never fails and never blocks.
    pub fn open(self: &Arc<Self>) -> ReaderHandle {
        self.readers.fetch_add(1, Ordering::AcqRel);
        ReaderHandle {
            pipe: Arc::clone(self),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Close a reader handle (same as dropping it)
    pub fn close(&self, handle: ReaderHandle) {
        debug_assert!(Arc::ptr_eq(&self.alert, &handle.pipe.alert));
        drop(handle);
    }

    fn release(&self) {
        let prev = self.readers.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            panic!("wakeup pipe {}: reader count underflow", self.name);
        }
    }

    /// Number of open reader handles
    pub fn reader_count(&self) -> usize {
        self.readers.load(Ordering::Acquire)
    }

    /// Readers currently blocked in a wait
    pub fn waiting(&self) -> usize {
        self.alert.queue.waiter_count()
    }

    pub fn alert_pending(&self) -> bool {
        self.alert.pending.load(Ordering::Acquire)
    }

    pub fn interval_ns(&self) -> u64 {
        self.limiter.interval_ns()
    }

    /// Timestamp of the last signal that passed the rate limiter
    pub fn last_signal_ts(&self) -> Option<u64> {
        self.limiter.last_signal_ts()
    }

    /// Request a wakeup of blocked readers at time `now` (nanoseconds).
    ///
    /// Never blocks, never allocates, and may be called concurrently from
    /// any number of threads.
    pub fn signal(&self, now: u64) -> SignalOutcome {
        if self.torn_down.load(Ordering::Acquire) {
            return SignalOutcome::Closed;
        }
        if !self.limiter.try_acquire(now) {
            self.rate_limited.fetch_add(1, Ordering::Relaxed);
            return SignalOutcome::RateLimited;
        }
        if self.readers.load(Ordering::Acquire) == 0 {
            self.no_readers.fetch_add(1, Ordering::Relaxed);
            return SignalOutcome::NoReaders;
        }
        self.schedule_wake()
    }

    /// Queue a wake episode for a signal that passed the limiter
    fn schedule_wake(&self) -> SignalOutcome {
        if self.work.schedule() {
            self.delivered.fetch_add(1, Ordering::Relaxed);
            SignalOutcome::Delivered
        } else if self.torn_down.load(Ordering::Acquire) {
            // Refused by a wake unit that destroy() disabled meanwhile
            SignalOutcome::Closed
        } else {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            SignalOutcome::Coalesced
        }
    }

    /// Block until the pending wake episode (if any) has run
    pub fn flush(&self) {
        self.work.sync();
    }

    /// Tear the pipe down.
    ///
    /// Waits for an in-flight wake episode to finish, disables the wake unit
    /// for good, then releases every blocked reader with
    /// [`WaitOutcome::Closed`]. Idempotent.
    pub fn destroy(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.work.disable_sync();
        self.alert.close();
        debug!("wakeup pipe {} destroyed", self.name);
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    pub fn wake_state(&self) -> WorkState {
        self.work.state()
    }

    pub fn stats(&self) -> WakeupPipeStats {
        WakeupPipeStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            no_readers: self.no_readers.load(Ordering::Relaxed),
            wakes: self.alert.episodes.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for WakeupPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeupPipe")
            .field("name", &self.name)
            .field("readers", &self.reader_count())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

/// An open reader of a [`WakeupPipe`]. Dropping it closes it.
pub struct ReaderHandle {
    pipe: Arc<WakeupPipe>,
    interrupted: Arc<AtomicBool>,
}

impl ReaderHandle {
    pub fn pipe(&self) -> &Arc<WakeupPipe> {
        &self.pipe
    }

    /// Block until the next wake episode
    pub fn wait_for_alert(&self) -> WaitOutcome {
        self.wait(None)
    }

    pub fn wait_for_alert_timeout(&self, timeout: Duration) -> WaitOutcome {
        self.wait(Some(timeout))
    }

    /// Blocking read: `Ok(0)` once an alert arrives, `Err(Interrupted)` if
    /// interrupted first, `Err(PipeClosed)` once the pipe is torn down.
    /// `buf` is never written.
    pub fn read(&self, _buf: &mut [u8]) -> TrackerResult<usize> {
        match self.wait(None) {
            WaitOutcome::Interrupted => Err(TrackerError::Interrupted),
            WaitOutcome::Closed => Err(TrackerError::PipeClosed(self.pipe.name.clone())),
            WaitOutcome::Alert { .. } | WaitOutcome::TimedOut => Ok(0),
        }
    }

    /// Handle for interrupting this reader from another thread
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            flag: Arc::clone(&self.interrupted),
            alert: Arc::clone(&self.pipe.alert),
        }
    }

    /// Clear a delivered interrupt so the next wait blocks again
    pub fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    /// Close the handle
    pub fn close(self) {}

    fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let alert = &self.pipe.alert;
        let start = alert.episodes.load(Ordering::SeqCst);
        // A deadline past what Instant can hold is no deadline
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        loop {
            let seen = alert.queue.sequence();

            if self.interrupted.load(Ordering::SeqCst) {
                return WaitOutcome::Interrupted;
            }
            // Level-triggered: an unconsumed alert releases immediately
            if alert.pending.swap(false, Ordering::AcqRel) {
                return WaitOutcome::Alert { observed: true };
            }
            if alert.episodes.load(Ordering::SeqCst) != start {
                // Released by an episode; the flag may still be unclaimed
                return WaitOutcome::Alert {
                    observed: alert.pending.swap(false, Ordering::AcqRel),
                };
            }
            if alert.closed.load(Ordering::SeqCst) {
                return WaitOutcome::Closed;
            }

            let remaining = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return WaitOutcome::TimedOut;
                    }
                    Some(d - now)
                }
                None => None,
            };
            alert.queue.wait(seen, remaining);
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.pipe.release();
    }
}

impl std::fmt::Debug for ReaderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderHandle")
            .field("pipe", &self.pipe.name)
            .field("interrupted", &self.interrupted.load(Ordering::Relaxed))
            .finish()
    }
}

/// Interrupts one reader's current and future waits until cleared
#[derive(Clone)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
    alert: Arc<Alert>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // Other readers wake spuriously, re-check and sleep again
        self.alert.queue.wake_all();
    }
}

impl std::fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupter")
            .field("pending", &self.flag.load(Ordering::Relaxed))
            .finish()
    }
}
