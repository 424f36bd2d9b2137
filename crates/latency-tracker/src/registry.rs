//! Tracker registry
//!
//! Owns the control root, the workqueue that runs every wake unit, and the
//! set of live trackers. Setup is all-or-nothing; cleanup is idempotent and
//! runs in dependency order: trackers (pipes first), then the root, then
//! the workqueue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use latency_tracker_core::error::{TrackerError, TrackerResult};
use latency_tracker_core::{Clock, EventSink, LogSink, TrackerParams};
use latency_tracker_runtime::{MonotonicClock, TrackerConfig, Workqueue};
use log::{info, warn};

use crate::namespace::Namespace;
use crate::tracker::{Tracker, TrackerContext};

/// Registry of trackers under one control root
pub struct Registry {
    config: TrackerConfig,
    ctx: TrackerContext,
    trackers: RwLock<HashMap<String, Arc<Tracker>>>,
    live: AtomicBool,
}

impl Registry {
    /// Set up with a private namespace, the OS monotonic clock and a
    /// log-backed event sink
    pub fn setup(config: TrackerConfig) -> TrackerResult<Self> {
        let namespace = Arc::new(Namespace::new(config.max_nodes));
        Self::setup_with(
            config,
            namespace,
            Arc::new(MonotonicClock::new()),
            Arc::new(LogSink),
        )
    }

    /// Set up under a shared namespace with explicit clock and sink.
    ///
    /// Fails with [`TrackerError::RootCreation`] if the root name is already
    /// taken in `namespace`; nothing is left behind on any failure.
    pub fn setup_with(
        config: TrackerConfig,
        namespace: Arc<Namespace>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> TrackerResult<Self> {
        config.validate()?;

        let root = namespace
            .create_dir("", &config.root_name)
            .map_err(|source| TrackerError::RootCreation {
                name: config.root_name.clone(),
                source,
            })?;

        let workqueue = match Workqueue::start(config.workqueue_config()) {
            Ok(wq) => Arc::new(wq),
            Err(e) => {
                namespace.remove_recursive(&root);
                return Err(e);
            }
        };

        info!("latency tracker registry up at {}", root);

        let ctx = TrackerContext {
            namespace,
            root,
            workqueue,
            clock,
            sink,
            rate_limit_ns: config.rate_limit_ns(),
        };

        Ok(Self {
            config,
            ctx,
            trackers: RwLock::new(HashMap::new()),
            live: AtomicBool::new(true),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.ctx.namespace
    }

    /// Namespace path of the control root
    pub fn root(&self) -> &str {
        &self.ctx.root
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Register a tracker named `name` with the configured default
    /// parameters.
    ///
    /// A name already in use fails with [`TrackerError::DirectoryCreation`]
    /// and leaves the existing tracker untouched.
    pub fn add_tracker(&self, name: &str) -> TrackerResult<Arc<Tracker>> {
        if !self.is_live() {
            return Err(TrackerError::ShutDown);
        }

        let params = TrackerParams::new(
            self.config.default_threshold_ns,
            self.config.default_timeout_ns,
        );
        let tracker = Tracker::create(self.ctx.clone(), name, params)?;

        let mut trackers = self.trackers.write().unwrap_or_else(|e| e.into_inner());
        // Cleanup may have drained the table while we were creating nodes
        if !self.is_live() {
            drop(trackers);
            tracker.teardown();
            return Err(TrackerError::ShutDown);
        }
        trackers.insert(name.to_string(), Arc::clone(&tracker));
        drop(trackers);

        info!("tracker {} added at {}", name, tracker.path());
        Ok(tracker)
    }

    /// Remove a tracker: tear down its pipe, then its directory. Idempotent.
    pub fn remove_tracker(&self, tracker: &Tracker) {
        tracker.teardown();
        let mut trackers = self.trackers.write().unwrap_or_else(|e| e.into_inner());
        // A newer tracker may have taken the name since
        if trackers
            .get(tracker.name())
            .is_some_and(|t| std::ptr::eq(Arc::as_ptr(t), tracker))
        {
            trackers.remove(tracker.name());
        }
    }

    /// Remove the tracker registered as `name`, if any
    pub fn remove_tracker_by_name(&self, name: &str) -> bool {
        match self.tracker(name) {
            Some(tracker) => {
                self.remove_tracker(&tracker);
                true
            }
            None => false,
        }
    }

    pub fn tracker(&self, name: &str) -> Option<Arc<Tracker>> {
        self.trackers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Names of live trackers, sorted
    pub fn trackers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .trackers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Tear everything down. Safe to call more than once.
    pub fn cleanup(&self) {
        if !self.live.swap(false, Ordering::AcqRel) {
            return;
        }

        let drained: Vec<Arc<Tracker>> = self
            .trackers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, t)| t)
            .collect();
        for tracker in &drained {
            tracker.teardown();
        }

        let leftover = self.ctx.namespace.remove_recursive(&self.ctx.root);
        if leftover > 1 {
            warn!("removed {} stray nodes under {}", leftover - 1, self.ctx.root);
        }

        if let Some(stats) = self.ctx.workqueue.shutdown() {
            info!(
                "latency tracker registry down: {} trackers, {} wakes run",
                drained.len(),
                stats.executed
            );
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("root", &self.ctx.root)
            .field("trackers", &self.trackers())
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{SignalOutcome, WaitOutcome};
    use latency_tracker_core::error::NodeError;
    use latency_tracker_core::{Comm, LatencyEvent, ManualClock, NullSink};
    use std::thread;
    use std::time::{Duration, Instant};

    const SEC: u64 = 1_000_000_000;

    fn config() -> TrackerConfig {
        TrackerConfig::new()
    }

    fn registry_in(namespace: Arc<Namespace>, clock: Arc<ManualClock>) -> Registry {
        Registry::setup_with(config(), namespace, clock, Arc::new(NullSink)).unwrap()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_setup_and_cleanup() {
        let ns = Arc::new(Namespace::new(64));
        let registry = registry_in(Arc::clone(&ns), Arc::new(ManualClock::new(0)));
        assert_eq!(registry.root(), "latency");
        assert!(ns.exists("latency"));

        registry.cleanup();
        assert!(!ns.exists("latency"));
        assert!(!registry.is_live());
        registry.cleanup();
        assert_eq!(ns.node_count(), 0);
    }

    #[test]
    fn test_root_name_collision_fails_setup() {
        let ns = Arc::new(Namespace::new(64));
        let _first = registry_in(Arc::clone(&ns), Arc::new(ManualClock::new(0)));

        let err = Registry::setup_with(
            config(),
            Arc::clone(&ns),
            Arc::new(ManualClock::new(0)),
            Arc::new(NullSink),
        )
        .unwrap_err();
        assert_eq!(
            err,
            TrackerError::RootCreation {
                name: "latency".into(),
                source: NodeError::Exists,
            }
        );
        assert!(ns.exists("latency"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Registry::setup(config().root_name("")).unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[test]
    fn test_add_tracker_exposes_parameters() {
        let ns = Arc::new(Namespace::new(64));
        let registry = Registry::setup_with(
            config().default_threshold_ns(500).default_timeout_ns(7),
            Arc::clone(&ns),
            Arc::new(ManualClock::new(0)),
            Arc::new(NullSink),
        )
        .unwrap();

        let t = registry.add_tracker("sched").unwrap();
        assert_eq!(t.path(), "latency/sched");
        assert_eq!(
            ns.list("latency/sched").unwrap(),
            vec!["threshold".to_string(), "timeout".to_string()]
        );
        assert_eq!(ns.read_u64("latency/sched/threshold").unwrap(), 500);
        assert_eq!(ns.read_u64("latency/sched/timeout").unwrap(), 7);

        // Writes through the namespace are visible to the tracker at once
        ns.write_u64("latency/sched/threshold", 1_000_000).unwrap();
        assert_eq!(t.threshold(), 1_000_000);
        t.set_timeout(42);
        assert_eq!(ns.read_u64("latency/sched/timeout").unwrap(), 42);
    }

    #[test]
    fn test_duplicate_tracker_name() {
        let ns = Arc::new(Namespace::new(64));
        let registry = registry_in(Arc::clone(&ns), Arc::new(ManualClock::new(0)));

        let first = registry.add_tracker("x").unwrap();
        first.set_threshold(9);
        let err = registry.add_tracker("x").unwrap_err();
        assert!(matches!(err, TrackerError::DirectoryCreation { .. }));

        assert!(first.is_registered());
        assert_eq!(ns.read_u64("latency/x/threshold").unwrap(), 9);
        assert_eq!(registry.trackers(), vec!["x".to_string()]);
    }

    #[test]
    fn test_parameter_failure_rolls_back_directory() {
        // Root and tracker directory fit, the threshold entry does not
        let ns = Arc::new(Namespace::new(2));
        let registry = registry_in(Arc::clone(&ns), Arc::new(ManualClock::new(0)));

        let err = registry.add_tracker("sched").unwrap_err();
        assert_eq!(
            err,
            TrackerError::ParameterExposure {
                tracker: "sched".into(),
                entry: "threshold",
                source: NodeError::Exhausted,
            }
        );
        assert!(!ns.exists("latency/sched"));
        assert_eq!(ns.node_count(), 1);
        assert!(registry.tracker("sched").is_none());
    }

    #[test]
    fn test_timeout_failure_rolls_back_threshold() {
        let ns = Arc::new(Namespace::new(3));
        let registry = registry_in(Arc::clone(&ns), Arc::new(ManualClock::new(0)));

        let err = registry.add_tracker("sched").unwrap_err();
        assert!(matches!(
            err,
            TrackerError::ParameterExposure { entry: "timeout", .. }
        ));
        assert_eq!(ns.node_count(), 1);
    }

    #[test]
    fn test_remove_tracker_is_idempotent() {
        let ns = Arc::new(Namespace::new(64));
        let registry = registry_in(Arc::clone(&ns), Arc::new(ManualClock::new(0)));

        let t = registry.add_tracker("sched").unwrap();
        t.enable_wakeup_pipe().unwrap();
        assert!(ns.exists("latency/sched/wakeup_pipe"));

        registry.remove_tracker(&t);
        registry.remove_tracker(&t);
        assert!(!ns.exists("latency/sched"));
        assert!(!t.is_registered());
        assert!(t.notify().is_none());
        assert_eq!(
            t.enable_wakeup_pipe().unwrap_err(),
            TrackerError::NotRegistered("sched".into())
        );

        // The name is free again
        let again = registry.add_tracker("sched").unwrap();
        registry.remove_tracker(&t);
        assert!(again.is_registered());
        assert!(registry.tracker("sched").is_some());
    }

    #[test]
    fn test_enable_wakeup_pipe_returns_existing() {
        let registry = registry_in(Arc::new(Namespace::new(64)), Arc::new(ManualClock::new(0)));
        let t = registry.add_tracker("sched").unwrap();

        let a = t.enable_wakeup_pipe().unwrap();
        let b = t.enable_wakeup_pipe_with_interval(5).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.interval_ns(), SEC);
    }

    #[test]
    fn test_pipe_creation_failure_leaves_tracker_intact() {
        // Root, directory and both parameters: no room for the pipe node
        let ns = Arc::new(Namespace::new(4));
        let registry = registry_in(Arc::clone(&ns), Arc::new(ManualClock::new(0)));
        let t = registry.add_tracker("sched").unwrap();

        let err = t.enable_wakeup_pipe().unwrap_err();
        assert!(matches!(err, TrackerError::PipeCreation { .. }));
        assert!(t.wakeup_pipe().is_none());
        assert!(t.is_registered());
    }

    #[test]
    fn test_subfolder() {
        let ns = Arc::new(Namespace::new(64));
        let registry = registry_in(Arc::clone(&ns), Arc::new(ManualClock::new(0)));
        let t = registry.add_tracker("net").unwrap();

        assert_eq!(t.add_subfolder("per_cpu").unwrap(), "latency/net/per_cpu");
        assert!(matches!(
            t.add_subfolder("per_cpu"),
            Err(TrackerError::SubfolderCreation { .. })
        ));
        registry.remove_tracker(&t);
        assert!(!ns.exists("latency/net/per_cpu"));
    }

    #[test]
    fn test_sched_scenario_two_readers() {
        let ns = Arc::new(Namespace::new(64));
        let clock = Arc::new(ManualClock::new(100 * SEC));
        let registry = registry_in(Arc::clone(&ns), Arc::clone(&clock));

        let t = registry.add_tracker("sched").unwrap();
        let pipe = t.enable_wakeup_pipe().unwrap();
        ns.write_u64("latency/sched/threshold", 1_000_000).unwrap();

        let r1 = ns.open_pipe("latency/sched/wakeup_pipe").unwrap();
        let r2 = ns.open_pipe("latency/sched/wakeup_pipe").unwrap();
        let event = LatencyEvent::Wakeup {
            comm: Comm::new("kworker/0:1"),
            pid: 42,
            delay: 2_000_000,
            flag: 0,
        };
        assert!(t.params().exceeds_threshold(2_000_000));

        let wake_both = |expect: SignalOutcome, signal: &dyn Fn() -> Option<SignalOutcome>| {
            thread::scope(|s| {
                let j1 = s.spawn(|| r1.wait_for_alert());
                let j2 = s.spawn(|| r2.wait_for_alert());
                wait_until(|| pipe.waiting() == 2);
                assert_eq!(signal(), Some(expect));
                let outcomes = [j1.join().unwrap(), j2.join().unwrap()];
                let observers = outcomes
                    .iter()
                    .filter(|o| **o == WaitOutcome::Alert { observed: true })
                    .count();
                assert!(outcomes.iter().all(|o| matches!(o, WaitOutcome::Alert { .. })));
                assert_eq!(observers, 1);
            });
            pipe.flush();
        };

        wake_both(SignalOutcome::Delivered, &|| t.report(&event));
        assert!(!pipe.alert_pending());

        // 10 ns later: dropped, nobody wakes
        clock.advance(10);
        assert_eq!(t.notify(), Some(SignalOutcome::RateLimited));
        assert_eq!(
            r1.wait_for_alert_timeout(Duration::from_millis(20)),
            WaitOutcome::TimedOut
        );

        // 2 s later: both released again
        clock.advance(2 * SEC);
        wake_both(SignalOutcome::Delivered, &|| t.notify());
        assert_eq!(pipe.stats().wakes, 2);
        assert_eq!(pipe.last_signal_ts(), Some(102 * SEC + 10));
    }

    #[test]
    fn test_remove_tracker_closes_blocked_reader() {
        let registry = registry_in(Arc::new(Namespace::new(64)), Arc::new(ManualClock::new(0)));
        let t = registry.add_tracker("sched").unwrap();
        let pipe = t.enable_wakeup_pipe().unwrap();
        let reader = t.open_wakeup_pipe().unwrap();

        let outcome = thread::scope(|s| {
            let j = s.spawn(|| reader.wait_for_alert());
            wait_until(|| pipe.waiting() == 1);
            registry.remove_tracker(&t);
            j.join().unwrap()
        });
        assert_eq!(outcome, WaitOutcome::Closed);
        assert!(pipe.is_torn_down());
    }

    #[test]
    fn test_cleanup_tears_down_everything() {
        let ns = Arc::new(Namespace::new(64));
        let registry = registry_in(Arc::clone(&ns), Arc::new(ManualClock::new(0)));
        let a = registry.add_tracker("a").unwrap();
        let b = registry.add_tracker("b").unwrap();
        let pipe = b.enable_wakeup_pipe().unwrap();

        registry.cleanup();
        assert!(!a.is_registered());
        assert!(!b.is_registered());
        assert!(pipe.is_torn_down());
        assert_eq!(ns.node_count(), 0);
        assert!(registry.trackers().is_empty());
        assert_eq!(registry.add_tracker("c").unwrap_err(), TrackerError::ShutDown);
    }

    #[test]
    fn test_drop_cleans_up() {
        let ns = Arc::new(Namespace::new(64));
        {
            let registry = registry_in(Arc::clone(&ns), Arc::new(ManualClock::new(0)));
            registry.add_tracker("a").unwrap();
        }
        assert_eq!(ns.node_count(), 0);
    }
}
