//! Latency tracker configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (runtime)
//! 3. Library defaults (`config::defaults`)
//!
//! # Example
//!
//! ```rust,ignore
//! use latency_tracker_runtime::config::TrackerConfig;
//!
//! let config = TrackerConfig::from_env()
//!     .root_name("latency-test")
//!     .rate_limit(Duration::from_millis(250));
//! ```

pub mod defaults;

use std::time::Duration;

use latency_tracker_core::env::{env_get, env_get_str};
use latency_tracker_core::error::{TrackerError, TrackerResult};

use crate::deferred::WorkqueueConfig;

/// Registry-wide configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Name of the control root in the namespace
    pub root_name: String,
    /// Minimum interval between delivered wakeups, per channel
    pub rate_limit: Duration,
    /// Initial `threshold` of new trackers (ns)
    pub default_threshold_ns: u64,
    /// Initial `timeout` of new trackers (ns)
    pub default_timeout_ns: u64,
    /// Upper bound on namespace nodes, root included
    pub max_nodes: usize,
    /// Deferred wake units that may be queued at once
    pub workqueue_capacity: usize,
    /// Longest sleep of the workqueue thread with nothing queued
    pub worker_idle_poll: Duration,
    /// Workqueue thread name
    pub worker_thread_name: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl TrackerConfig {
    /// Create config from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `LT_ROOT_NAME` - Control root name
    /// - `LT_RATE_LIMIT_NS` - Wakeup rate limit in nanoseconds
    /// - `LT_DEFAULT_THRESHOLD_NS` - Initial threshold
    /// - `LT_DEFAULT_TIMEOUT_NS` - Initial timeout
    /// - `LT_MAX_NODES` - Namespace node budget
    /// - `LT_WORKQUEUE_CAPACITY` - Queued wake unit limit
    /// - `LT_WORKER_IDLE_MS` - Workqueue idle poll in milliseconds
    /// - `LT_WORKER_THREAD_NAME` - Workqueue thread name
    pub fn from_env() -> Self {
        Self {
            root_name: env_get_str("LT_ROOT_NAME", defaults::ROOT_NAME),
            rate_limit: Duration::from_nanos(env_get("LT_RATE_LIMIT_NS", defaults::RATE_LIMIT_NS)),
            default_threshold_ns: env_get("LT_DEFAULT_THRESHOLD_NS", defaults::THRESHOLD_NS),
            default_timeout_ns: env_get("LT_DEFAULT_TIMEOUT_NS", defaults::TIMEOUT_NS),
            max_nodes: env_get("LT_MAX_NODES", defaults::MAX_NODES),
            workqueue_capacity: env_get("LT_WORKQUEUE_CAPACITY", defaults::WORKQUEUE_CAPACITY),
            worker_idle_poll: Duration::from_millis(env_get(
                "LT_WORKER_IDLE_MS",
                defaults::WORKER_IDLE_MS,
            )),
            worker_thread_name: env_get_str("LT_WORKER_THREAD_NAME", defaults::WORKER_THREAD_NAME),
        }
    }

    /// Create config with explicit defaults (no env override).
    pub fn new() -> Self {
        Self {
            root_name: defaults::ROOT_NAME.to_string(),
            rate_limit: Duration::from_nanos(defaults::RATE_LIMIT_NS),
            default_threshold_ns: defaults::THRESHOLD_NS,
            default_timeout_ns: defaults::TIMEOUT_NS,
            max_nodes: defaults::MAX_NODES,
            workqueue_capacity: defaults::WORKQUEUE_CAPACITY,
            worker_idle_poll: Duration::from_millis(defaults::WORKER_IDLE_MS),
            worker_thread_name: defaults::WORKER_THREAD_NAME.to_string(),
        }
    }

    // Builder methods

    pub fn root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    pub fn rate_limit(mut self, d: Duration) -> Self {
        self.rate_limit = d;
        self
    }

    pub fn default_threshold_ns(mut self, ns: u64) -> Self {
        self.default_threshold_ns = ns;
        self
    }

    pub fn default_timeout_ns(mut self, ns: u64) -> Self {
        self.default_timeout_ns = ns;
        self
    }

    pub fn max_nodes(mut self, n: usize) -> Self {
        self.max_nodes = n;
        self
    }

    pub fn workqueue_capacity(mut self, cap: usize) -> Self {
        self.workqueue_capacity = cap;
        self
    }

    pub fn worker_idle_poll(mut self, d: Duration) -> Self {
        self.worker_idle_poll = d;
        self
    }

    pub fn worker_thread_name(mut self, name: impl Into<String>) -> Self {
        self.worker_thread_name = name.into();
        self
    }

    /// Rate limit as the nanosecond count stored in each channel
    pub fn rate_limit_ns(&self) -> u64 {
        u64::try_from(self.rate_limit.as_nanos()).unwrap_or(u64::MAX)
    }

    /// Settings for the registry's workqueue thread
    pub fn workqueue_config(&self) -> WorkqueueConfig {
        WorkqueueConfig {
            capacity: self.workqueue_capacity,
            idle_poll: self.worker_idle_poll,
            thread_name: self.worker_thread_name.clone(),
            stack_size: None,
        }
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> TrackerResult<()> {
        if self.root_name.is_empty() || self.root_name.contains('/') {
            return Err(TrackerError::Config("root_name must be a single non-empty path component"));
        }
        if self.max_nodes == 0 {
            return Err(TrackerError::Config("max_nodes must be > 0"));
        }
        if self.workqueue_capacity == 0 {
            return Err(TrackerError::Config("workqueue_capacity must be > 0"));
        }
        if self.worker_idle_poll.is_zero() {
            return Err(TrackerError::Config("worker_idle_poll must be > 0"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("Latency tracker configuration:");
        eprintln!("  root_name:              {}", self.root_name);
        eprintln!("  rate_limit:             {:?}", self.rate_limit);
        eprintln!("  default_threshold_ns:   {}", self.default_threshold_ns);
        eprintln!("  default_timeout_ns:     {}", self.default_timeout_ns);
        eprintln!("  max_nodes:              {}", self.max_nodes);
        eprintln!("  workqueue_capacity:     {}", self.workqueue_capacity);
        eprintln!("  worker_idle_poll:       {:?}", self.worker_idle_poll);
        eprintln!("  worker_thread_name:     {}", self.worker_thread_name);
    }
}
