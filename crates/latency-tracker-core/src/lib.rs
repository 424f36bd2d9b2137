//! # latency-tracker-core
//!
//! Core types for the latency tracker control plane.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Wait queues, the deferred-work thread and the monotonic clock live in
//! `latency-tracker-runtime`.
//!
//! ## Modules
//!
//! - `ratelimit` - Wakeup rate limiter
//! - `params` - Live-tunable tracker parameters
//! - `clock` - Monotonic clock abstraction
//! - `event` - Latency event records and the sink they are emitted to
//! - `error` - Error types
//! - `kprint` - Stderr backend for the `log` facade
//! - `env` - Environment variable utilities

pub mod ratelimit;
pub mod params;
pub mod clock;
pub mod event;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use ratelimit::{should_signal, RateLimiter};
pub use params::TrackerParams;
pub use clock::{Clock, ManualClock};
pub use event::{Comm, EventSink, LatencyEvent, LogSink, NullSink, StackText};
pub use error::{NodeError, TrackerError, TrackerResult};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str};

/// Fixed sizes shared with the event schema and the control namespace
pub mod constants {
    /// Length of a task command name, including the trailing NUL
    pub const TASK_COMM_LEN: usize = 16;

    /// Maximum length of stack or path text carried by an event
    pub const MAX_STACK_TEXT: usize = 256;

    /// Default minimum interval between delivered wakeups (1 second)
    pub const DEFAULT_RATE_LIMIT_NS: u64 = 1_000_000_000;

    /// Name of the control root in the namespace
    pub const DEFAULT_ROOT_NAME: &str = "latency";

    /// Entry names created under every tracker directory
    pub const THRESHOLD_ENTRY: &str = "threshold";
    pub const TIMEOUT_ENTRY: &str = "timeout";
    pub const WAKEUP_PIPE_ENTRY: &str = "wakeup_pipe";
}
