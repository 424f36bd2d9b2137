//! Tracker instances
//!
//! A tracker is one named measurement channel: a namespace directory with
//! live-tunable `threshold` and `timeout` entries, and an optional
//! wakeup pipe that readers block on. Trackers are created and removed
//! through the [`Registry`](crate::Registry).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use latency_tracker_core::constants::{THRESHOLD_ENTRY, TIMEOUT_ENTRY, WAKEUP_PIPE_ENTRY};
use latency_tracker_core::error::{TrackerError, TrackerResult};
use latency_tracker_core::{Clock, EventSink, LatencyEvent, TrackerParams};
use latency_tracker_runtime::Workqueue;
use log::{debug, info, warn};

use crate::namespace::Namespace;
use crate::pipe::{ReaderHandle, SignalOutcome, WakeupPipe};

/// Shared services a tracker is wired to
#[derive(Clone)]
pub(crate) struct TrackerContext {
    pub namespace: Arc<Namespace>,
    pub root: String,
    pub workqueue: Arc<Workqueue>,
    pub clock: Arc<dyn Clock>,
    pub sink: Arc<dyn EventSink>,
    pub rate_limit_ns: u64,
}

/// A registered tracker
pub struct Tracker {
    name: String,
    path: String,
    params: TrackerParams,
    pipe: Mutex<Option<Arc<WakeupPipe>>>,
    registered: AtomicBool,
    ctx: TrackerContext,
}

impl Tracker {
    /// Create the tracker directory and its parameter entries.
    ///
    /// On a parameter failure everything created so far is removed again.
    pub(crate) fn create(
        ctx: TrackerContext,
        name: &str,
        params: TrackerParams,
    ) -> TrackerResult<Arc<Self>> {
        let path = ctx
            .namespace
            .create_dir(&ctx.root, name)
            .map_err(|source| TrackerError::DirectoryCreation {
                name: name.to_string(),
                source,
            })?;

        let tracker = Arc::new(Self {
            name: name.to_string(),
            path,
            params,
            pipe: Mutex::new(None),
            registered: AtomicBool::new(true),
            ctx,
        });

        let entries = [
            (THRESHOLD_ENTRY, tracker.params.threshold_cell()),
            (TIMEOUT_ENTRY, tracker.params.timeout_cell()),
        ];
        for (entry, cell) in entries {
            if let Err(source) = tracker.ctx.namespace.create_u64(&tracker.path, entry, cell) {
                warn!("tracker {}: cannot expose {}: {}", name, entry, source);
                tracker.teardown();
                return Err(TrackerError::ParameterExposure {
                    tracker: name.to_string(),
                    entry,
                    source,
                });
            }
        }

        Ok(tracker)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace path of the tracker directory
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    pub fn threshold(&self) -> u64 {
        self.params.threshold()
    }

    pub fn set_threshold(&self, ns: u64) {
        self.params.set_threshold(ns);
    }

    pub fn timeout(&self) -> u64 {
        self.params.timeout()
    }

    pub fn set_timeout(&self, ns: u64) {
        self.params.set_timeout(ns);
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Expose the wakeup pipe with the registry's rate limit.
    ///
    /// Returns the existing pipe if already enabled.
    pub fn enable_wakeup_pipe(&self) -> TrackerResult<Arc<WakeupPipe>> {
        self.enable_wakeup_pipe_with_interval(self.ctx.rate_limit_ns)
    }

    /// Expose the wakeup pipe with a tracker-specific rate limit
    pub fn enable_wakeup_pipe_with_interval(&self, interval_ns: u64) -> TrackerResult<Arc<WakeupPipe>> {
        let mut slot = self.pipe.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pipe) = slot.as_ref() {
            return Ok(Arc::clone(pipe));
        }
        if !self.is_registered() {
            return Err(TrackerError::NotRegistered(self.name.clone()));
        }

        let pipe = WakeupPipe::new(&self.ctx.workqueue, self.name.clone(), interval_ns);
        if let Err(source) =
            self.ctx
                .namespace
                .create_pipe(&self.path, WAKEUP_PIPE_ENTRY, Arc::clone(&pipe))
        {
            pipe.destroy();
            return Err(TrackerError::PipeCreation {
                tracker: self.name.clone(),
                source,
            });
        }

        debug!("tracker {}: wakeup pipe enabled ({} ns)", self.name, interval_ns);
        *slot = Some(Arc::clone(&pipe));
        Ok(pipe)
    }

    pub fn wakeup_pipe(&self) -> Option<Arc<WakeupPipe>> {
        self.pipe.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Open a reader on the tracker's wakeup pipe
    pub fn open_wakeup_pipe(&self) -> TrackerResult<ReaderHandle> {
        self.wakeup_pipe()
            .map(|pipe| WakeupPipe::open(&pipe))
            .ok_or_else(|| TrackerError::NotFound(format!("{}/{}", self.path, WAKEUP_PIPE_ENTRY)))
    }

    /// Signal the wakeup pipe at the current clock time.
    ///
    /// `None` if the pipe is not enabled. Never blocks: if the pipe slot is
    /// being changed concurrently the signal is dropped.
    pub fn notify(&self) -> Option<SignalOutcome> {
        let pipe = self.pipe.try_lock().ok()?.clone()?;
        Some(pipe.signal(self.ctx.clock.now_ns()))
    }

    /// Emit `event` to the event sink, then signal readers
    pub fn report(&self, event: &LatencyEvent) -> Option<SignalOutcome> {
        self.ctx.sink.emit(event);
        self.notify()
    }

    /// Create a sub-directory under the tracker directory
    pub fn add_subfolder(&self, name: &str) -> TrackerResult<String> {
        if !self.is_registered() {
            return Err(TrackerError::NotRegistered(self.name.clone()));
        }
        self.ctx
            .namespace
            .create_dir(&self.path, name)
            .map_err(|source| TrackerError::SubfolderCreation {
                tracker: self.name.clone(),
                name: name.to_string(),
                source,
            })
    }

    /// Tear down the pipe, then remove the directory tree. Idempotent.
    pub(crate) fn teardown(&self) {
        if !self.registered.swap(false, Ordering::AcqRel) {
            return;
        }
        let pipe = self.pipe.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(pipe) = pipe {
            pipe.destroy();
        }
        let removed = self.ctx.namespace.remove_recursive(&self.path);
        info!("tracker {} removed ({} nodes)", self.name, removed);
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("threshold", &self.threshold())
            .field("timeout", &self.timeout())
            .field("registered", &self.is_registered())
            .finish()
    }
}
