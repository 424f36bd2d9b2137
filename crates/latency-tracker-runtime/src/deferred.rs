//! Deferred work
//!
//! Decouples "something happened" from "resume whoever is waiting". A
//! producer that may not block or allocate calls [`DeferredWork::schedule`];
//! the work runs later on a dedicated [`Workqueue`] thread where blocking
//! is legal.
//!
//! # State machine
//!
//! ```text
//!            schedule()            worker picks up
//!   IDLE ───────────────► QUEUED ───────────────► RUNNING ──schedule()──► RERUN
//!    ▲  ▲                   ▲                         │                     │
//!    │  └───────────────────┼─────────────────────────┘                     │
//!    │        func returns  └───────────────────────────────────────────────┘
//!    │ disable_sync()                       func returns, requeued
//!    ▼
//! DISABLED (terminal: schedule() is refused forever)
//! ```
//!
//! `schedule()` while QUEUED (or RERUN) is coalesced into the pending run.
//! While RUNNING the function may already be past the point that mattered
//! to the caller, so the unit is marked to run once more. `sync()` blocks
//! until the unit is back to IDLE.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use latency_tracker_core::error::{TrackerError, TrackerResult};
use log::{debug, error, info, warn};

use crate::parking::{PlatformWaitQueue, WaitQueue};

const WORK_IDLE: u8 = 0;
const WORK_QUEUED: u8 = 1;
const WORK_RUNNING: u8 = 2;
const WORK_DISABLED: u8 = 3;
/// RUNNING with another run requested
const WORK_RERUN: u8 = 4;

/// Observable state of a [`DeferredWork`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    Idle,
    Queued,
    Running,
    Disabled,
}

impl WorkState {
    fn from_u8(v: u8) -> Self {
        match v {
            WORK_IDLE => WorkState::Idle,
            WORK_QUEUED => WorkState::Queued,
            WORK_RUNNING | WORK_RERUN => WorkState::Running,
            _ => WorkState::Disabled,
        }
    }
}

/// A reusable unit of deferred work bound to one workqueue
pub struct DeferredWork {
    func: Box<dyn Fn() + Send + Sync>,
    state: AtomicU8,
    /// Woken every time the unit returns to IDLE
    done: PlatformWaitQueue,
    queue: Arc<WorkqueueInner>,
    runs: AtomicU64,
    name: String,
}

impl DeferredWork {
    /// Create an idle work unit that runs `func` on `workqueue`
    pub fn new<F>(workqueue: &Workqueue, name: impl Into<String>, func: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(Self {
            func: Box::new(func),
            state: AtomicU8::new(WORK_IDLE),
            done: PlatformWaitQueue::new(),
            queue: Arc::clone(&workqueue.inner),
            runs: AtomicU64::new(0),
            name: name.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkState {
        WorkState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of completed runs
    pub fn run_count(&self) -> u64 {
        self.runs.load(Ordering::Acquire)
    }

    /// Queue the unit for execution.
    ///
    /// Returns true if this call caused a fresh run (queued it, or asked a
    /// running instance to go again), false if it was coalesced into an
    /// already pending run, refused because the unit is disabled, or
    /// dropped because the workqueue is full or shut down.
    ///
    /// Never blocks, never allocates and never logs.
    pub fn schedule(self: &Arc<Self>) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let next = match current {
                WORK_IDLE => WORK_QUEUED,
                WORK_RUNNING => WORK_RERUN,
                _ => return false,
            };
            match self
                .state
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                // The worker requeues it when the current run returns
                Ok(WORK_RUNNING) => return true,
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        if self.queue.shutdown.load(Ordering::SeqCst) {
            self.back_to_idle();
            return false;
        }

        if self.queue.items.push(Arc::clone(self)).is_err() {
            self.back_to_idle();
            self.queue.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        // Lost the race with shutdown after the final drain: reclaim
        if self.queue.shutdown.load(Ordering::SeqCst)
            && self
                .state
                .compare_exchange(WORK_QUEUED, WORK_IDLE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            self.done.wake_all();
            return false;
        }

        self.queue.park.wake_all();
        true
    }

    /// Block until any queued or running instance has completed
    pub fn sync(&self) {
        loop {
            let seen = self.done.sequence();
            match self.state.load(Ordering::Acquire) {
                WORK_IDLE | WORK_DISABLED => return,
                _ => {
                    self.done.wait(seen, None);
                }
            }
        }
    }

    /// Wait for the unit to become idle, then disable it for good.
    ///
    /// After this returns, `func` is not running and will never run again.
    pub fn disable_sync(&self) {
        loop {
            let seen = self.done.sequence();
            match self.state.compare_exchange(
                WORK_IDLE,
                WORK_DISABLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) | Err(WORK_DISABLED) => return,
                Err(_) => {
                    self.done.wait(seen, None);
                }
            }
        }
    }

    /// Run the unit if it is queued (worker side)
    fn execute(self: &Arc<Self>) -> bool {
        if self
            .state
            .compare_exchange(WORK_QUEUED, WORK_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if catch_unwind(AssertUnwindSafe(|| (self.func)())).is_err() {
            error!("deferred work {} panicked", self.name);
        }

        self.runs.fetch_add(1, Ordering::AcqRel);

        match self.state.compare_exchange(
            WORK_RUNNING,
            WORK_IDLE,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => self.done.wake_all(),
            Err(_) => {
                // RERUN: scheduled again while running
                self.state.store(WORK_QUEUED, Ordering::Release);
                if self.queue.items.push(Arc::clone(self)).is_err() {
                    self.queue.dropped.fetch_add(1, Ordering::Relaxed);
                    self.back_to_idle();
                }
            }
        }
        true
    }

    fn back_to_idle(&self) {
        self.state.store(WORK_IDLE, Ordering::Release);
        self.done.wake_all();
    }
}

impl std::fmt::Debug for DeferredWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredWork")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("runs", &self.run_count())
            .finish()
    }
}

/// Configuration for the workqueue thread
#[derive(Debug, Clone)]
pub struct WorkqueueConfig {
    /// Maximum queued units before `schedule()` starts dropping
    pub capacity: usize,

    /// Upper bound on how long the thread sleeps with nothing queued
    pub idle_poll: Duration,

    /// Thread name
    pub thread_name: String,

    /// Stack size for the thread (None = system default)
    pub stack_size: Option<usize>,
}

impl Default for WorkqueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            idle_poll: Duration::from_millis(100),
            thread_name: "lt-wake".into(),
            stack_size: None,
        }
    }
}

/// Statistics from workqueue thread execution
#[derive(Debug, Clone, Default)]
pub struct WorkqueueStats {
    /// Units executed
    pub executed: u64,

    /// Queue entries skipped because the unit was no longer QUEUED
    pub skipped: u64,

    /// Maximum units executed in one drain
    pub max_batch_size: usize,

    /// Times the thread went to sleep
    pub sleeps: u64,

    /// Schedules dropped because the queue was full
    pub dropped: u64,
}

struct WorkqueueInner {
    items: ArrayQueue<Arc<DeferredWork>>,
    park: PlatformWaitQueue,
    shutdown: AtomicBool,
    /// Bumped on the schedule path, reported by the worker
    dropped: AtomicU64,
    name: String,
}

/// Dedicated thread that runs [`DeferredWork`] units
pub struct Workqueue {
    inner: Arc<WorkqueueInner>,
    handle: Mutex<Option<JoinHandle<WorkqueueStats>>>,
}

impl Workqueue {
    /// Spawn the workqueue thread
    pub fn start(config: WorkqueueConfig) -> TrackerResult<Self> {
        if config.capacity == 0 {
            return Err(TrackerError::Config("workqueue capacity must be > 0"));
        }

        let inner = Arc::new(WorkqueueInner {
            items: ArrayQueue::new(config.capacity),
            park: PlatformWaitQueue::new(),
            shutdown: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            name: config.thread_name.clone(),
        });

        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let worker_inner = Arc::clone(&inner);
        let idle_poll = config.idle_poll;
        let handle = builder
            .spawn(move || worker_loop(worker_inner, idle_poll))
            .map_err(|e| TrackerError::WorkerSpawn(e.to_string()))?;

        info!("workqueue {} started (capacity {})", config.thread_name, config.capacity);

        Ok(Self {
            inner,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Entries currently waiting in the queue
    pub fn pending(&self) -> usize {
        self.inner.items.len()
    }

    /// Schedules dropped so far because the queue was full
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Stop the thread after it has run everything already queued.
    ///
    /// Returns the thread's statistics on the first call, `None` after.
    pub fn shutdown(&self) -> Option<WorkqueueStats> {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.park.wake_all();

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;

        let stats = match handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                error!("workqueue {} thread panicked", self.inner.name);
                None
            }
        };

        // Anything that slipped in after the thread's last drain runs here
        let mut late = WorkqueueStats::default();
        drain(&self.inner, &mut late);

        let stats = stats.map(|mut stats| {
            report_drops(&self.inner, &mut stats);
            stats
        });
        info!("workqueue {} stopped", self.inner.name);
        stats
    }
}

impl Drop for Workqueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Workqueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workqueue")
            .field("name", &self.inner.name)
            .field("pending", &self.pending())
            .field("running", &self.is_running())
            .finish()
    }
}

fn drain(inner: &WorkqueueInner, stats: &mut WorkqueueStats) -> usize {
    let mut batch = 0;
    while let Some(work) = inner.items.pop() {
        if work.execute() {
            batch += 1;
        } else {
            stats.skipped += 1;
        }
    }
    stats.executed += batch as u64;
    stats.max_batch_size = stats.max_batch_size.max(batch);
    batch
}

/// Log schedules dropped since the last look
fn report_drops(inner: &WorkqueueInner, stats: &mut WorkqueueStats) {
    let dropped = inner.dropped.load(Ordering::Relaxed);
    if dropped > stats.dropped {
        warn!(
            "workqueue {} full, dropped {} schedule(s)",
            inner.name,
            dropped - stats.dropped
        );
        stats.dropped = dropped;
    }
}

/// Main workqueue loop
fn worker_loop(inner: Arc<WorkqueueInner>, idle_poll: Duration) -> WorkqueueStats {
    let mut stats = WorkqueueStats::default();

    loop {
        let seen = inner.park.sequence();
        let batch = drain(&inner, &mut stats);
        report_drops(&inner, &mut stats);

        if inner.shutdown.load(Ordering::SeqCst) {
            drain(&inner, &mut stats);
            break;
        }

        if batch == 0 {
            stats.sleeps += 1;
            inner.park.wait(seen, Some(idle_poll));
        }
    }

    debug!(
        "workqueue {} exiting: executed={} skipped={}",
        inner.name, stats.executed, stats.skipped
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn test_queue() -> Workqueue {
        Workqueue::start(WorkqueueConfig {
            thread_name: "lt-wake-test".into(),
            ..WorkqueueConfig::default()
        })
        .unwrap()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let start = Instant::now();
        while !cond() {
            assert!(start.elapsed() < Duration::from_secs(5), "condition never held");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_schedule_runs_on_worker() {
        let wq = test_queue();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let work = DeferredWork::new(&wq, "count", move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert!(work.schedule());
        work.sync();
        wait_until(|| work.run_count() == 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(work.state(), WorkState::Idle);
    }

    fn gated(wq: &Workqueue, name: &str, gate: &Arc<AtomicBool>) -> Arc<DeferredWork> {
        let g = Arc::clone(gate);
        DeferredWork::new(wq, name, move || {
            while !g.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
        })
    }

    #[test]
    fn test_schedule_while_running_runs_again() {
        let wq = test_queue();
        let gate = Arc::new(AtomicBool::new(false));
        let work = gated(&wq, "gated", &gate);

        assert!(work.schedule());
        wait_until(|| work.state() == WorkState::Running);

        // The running instance may be past whatever the caller changed
        assert!(work.schedule());
        // Further schedules fold into that one extra run
        assert!(!work.schedule());
        assert_eq!(work.state(), WorkState::Running);

        gate.store(true, Ordering::SeqCst);
        work.sync();
        assert_eq!(work.run_count(), 2);
        assert_eq!(work.state(), WorkState::Idle);

        // Idle again: a fresh schedule is accepted
        assert!(work.schedule());
        work.sync();
        wait_until(|| work.run_count() == 3);
    }

    #[test]
    fn test_schedule_while_queued_is_coalesced() {
        let wq = test_queue();
        let gate = Arc::new(AtomicBool::new(false));
        let blocker = gated(&wq, "blocker", &gate);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let work = DeferredWork::new(&wq, "behind", move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert!(blocker.schedule());
        wait_until(|| blocker.state() == WorkState::Running);

        assert!(work.schedule());
        assert_eq!(work.state(), WorkState::Queued);
        assert!(!work.schedule());
        assert!(!work.schedule());

        gate.store(true, Ordering::SeqCst);
        work.sync();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_full_queue_counts_drops() {
        let wq = Workqueue::start(WorkqueueConfig {
            capacity: 1,
            thread_name: "lt-wake-full".into(),
            ..WorkqueueConfig::default()
        })
        .unwrap();
        let gate = Arc::new(AtomicBool::new(false));
        let blocker = gated(&wq, "blocker", &gate);
        let queued = DeferredWork::new(&wq, "queued", || {});
        let dropped = DeferredWork::new(&wq, "dropped", || {});

        assert!(blocker.schedule());
        wait_until(|| blocker.state() == WorkState::Running);
        assert!(queued.schedule());

        assert!(!dropped.schedule());
        assert_eq!(dropped.state(), WorkState::Idle);
        assert_eq!(wq.dropped(), 1);

        // Coalescing is not a drop
        assert!(!queued.schedule());
        assert_eq!(wq.dropped(), 1);

        gate.store(true, Ordering::SeqCst);
        queued.sync();
        assert_eq!(queued.run_count(), 1);
        assert_eq!(dropped.run_count(), 0);

        let stats = wq.shutdown().unwrap();
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_sync_waits_for_running_work() {
        let wq = test_queue();
        let finished = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&finished);
        let work = DeferredWork::new(&wq, "slow", move || {
            thread::sleep(Duration::from_millis(100));
            f.store(true, Ordering::SeqCst);
        });

        work.schedule();
        wait_until(|| work.state() == WorkState::Running);
        work.sync();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_disable_sync_refuses_later_schedules() {
        let wq = test_queue();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let work = DeferredWork::new(&wq, "once", move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        work.schedule();
        work.disable_sync();
        assert_eq!(work.state(), WorkState::Disabled);
        assert!(!work.schedule());

        // Disabling twice is harmless
        work.disable_sync();
        thread::sleep(Duration::from_millis(20));
        assert!(hits.load(Ordering::SeqCst) <= 1);
    }

    #[test]
    fn test_panicking_work_returns_to_idle() {
        let wq = test_queue();
        let work = DeferredWork::new(&wq, "boom", || panic!("deferred failure"));

        work.schedule();
        work.sync();
        wait_until(|| work.run_count() == 1);
        assert_eq!(work.state(), WorkState::Idle);
    }

    #[test]
    fn test_shutdown_runs_queued_work_and_refuses_new() {
        let wq = test_queue();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let work = DeferredWork::new(&wq, "late", move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        work.schedule();
        let stats = wq.shutdown();
        assert!(stats.is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(!wq.is_running());
        assert!(!work.schedule());
        assert_eq!(work.state(), WorkState::Idle);
        assert!(wq.shutdown().is_none());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = Workqueue::start(WorkqueueConfig {
            capacity: 0,
            ..WorkqueueConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }
}
