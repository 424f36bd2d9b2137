//! Compile-time defaults for [`TrackerConfig`](super::TrackerConfig)

use latency_tracker_core::constants;

pub const ROOT_NAME: &str = constants::DEFAULT_ROOT_NAME;
pub const RATE_LIMIT_NS: u64 = constants::DEFAULT_RATE_LIMIT_NS;
pub const THRESHOLD_NS: u64 = 0;
pub const TIMEOUT_NS: u64 = 0;
pub const MAX_NODES: usize = 4096;
pub const WORKQUEUE_CAPACITY: usize = 1024;
pub const WORKER_IDLE_MS: u64 = 100;
pub const WORKER_THREAD_NAME: &str = "lt-wake";
