//! # latency-tracker-runtime
//!
//! Platform-specific runtime pieces for the latency tracker.
//!
//! This crate provides:
//! - Broadcast wait queues (futex on Linux, Condvar elsewhere)
//! - Deferred work and the workqueue thread that runs it
//! - The OS monotonic clock
//! - Registry configuration with environment overrides
//! - Signal forwarding for interrupting blocked readers

pub mod config;
pub mod parking;
pub mod deferred;
pub mod clock;
pub mod signal;

// Re-exports
pub use config::TrackerConfig;
pub use parking::{new_wait_queue, PlatformWaitQueue, WaitQueue};
pub use deferred::{DeferredWork, WorkState, Workqueue, WorkqueueConfig, WorkqueueStats};
pub use clock::MonotonicClock;
