//! # latency-tracker - notification and control plane
//!
//! Named trackers exposed in a hierarchical control namespace, each with
//! live-tunable `threshold`/`timeout` parameters and an optional wakeup pipe
//! that userspace-style readers block on until the tracker signals.
//!
//! ## Quick Start
//!
//! ```ignore
//! use latency_tracker::{Registry, TrackerConfig, WaitOutcome};
//!
//! latency_tracker::init_logging();
//! let registry = Registry::setup(TrackerConfig::from_env())?;
//!
//! let sched = registry.add_tracker("sched")?;
//! sched.enable_wakeup_pipe()?;
//! registry.namespace().write_u64("latency/sched/threshold", 1_000_000)?;
//!
//! // Reader side
//! let reader = registry.namespace().open_pipe("latency/sched/wakeup_pipe")?;
//! if let WaitOutcome::Alert { .. } = reader.wait_for_alert() {
//!     // go collect the latency records
//! }
//!
//! // Producer side (any thread, never blocks)
//! sched.notify();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        Registry                            │
//! │        control root, tracker table, setup / cleanup        │
//! └────────────────────────────────────────────────────────────┘
//!              │                                │
//!              ▼                                ▼
//! ┌──────────────────────────┐     ┌──────────────────────────┐
//! │         Tracker          │     │        Namespace         │
//! │ params, report / notify  │────►│  dirs, u64 values, pipes │
//! └──────────────────────────┘     └──────────────────────────┘
//!              │
//!              ▼
//! ┌──────────────────────────┐     ┌──────────────────────────┐
//! │       WakeupPipe         │────►│   Workqueue (lt-wake)    │
//! │ rate limit, readers      │     │   deferred wake units    │
//! └──────────────────────────┘     └──────────────────────────┘
//! ```

pub mod namespace;
pub mod pipe;
pub mod registry;
pub mod tracker;

pub use namespace::{EntryKind, Namespace};
pub use pipe::{Interrupter, ReaderHandle, SignalOutcome, WaitOutcome, WakeupPipe, WakeupPipeStats};
pub use registry::Registry;
pub use tracker::Tracker;

// Re-export from the lower crates
pub use latency_tracker_core::{
    constants, should_signal, Clock, Comm, EventSink, LatencyEvent, LogSink, ManualClock,
    NodeError, NullSink, RateLimiter, StackText, TrackerError, TrackerParams, TrackerResult,
};
pub use latency_tracker_runtime::{MonotonicClock, TrackerConfig, WorkqueueStats};

#[cfg(unix)]
pub use latency_tracker_runtime::signal;

/// Install the stderr logger (`LT_LOG_LEVEL`, `LT_FLUSH_EPRINT`). Idempotent.
pub fn init_logging() {
    latency_tracker_core::kprint::init();
}
