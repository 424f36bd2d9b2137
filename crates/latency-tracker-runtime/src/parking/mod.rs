//! Broadcast wait queues
//!
//! A wait queue is a sequence counter that threads can sleep on. A waker
//! publishes its state change first, then calls `wake_all()`, which bumps
//! the sequence and releases every sleeper. A sleeper snapshots the
//! sequence *before* checking its wake condition and passes that snapshot
//! to `wait()`; if anything was published in between, `wait()` returns
//! immediately, so no wakeup is ever lost.
//!
//! ```ignore
//! loop {
//!     let seen = queue.sequence();
//!     if condition_holds() {
//!         break;
//!     }
//!     queue.wait(seen, None);
//! }
//! ```
//!
//! Platform-specific implementations use the most efficient primitive
//! available.

use std::time::Duration;

/// Sleep/wake primitive shared by readers, the workqueue thread and
/// `DeferredWork::sync()`.
pub trait WaitQueue: Send + Sync {
    /// Current sequence value
    fn sequence(&self) -> u32;

    /// Sleep while the sequence still equals `seen`, or until `timeout`.
    ///
    /// Returns:
    /// - `true` if the sequence moved
    /// - `false` on timeout or spurious wakeup
    ///
    /// Callers re-check their condition regardless of the return value.
    fn wait(&self, seen: u32, timeout: Option<Duration>) -> bool;

    /// Bump the sequence and wake every sleeper
    fn wake_all(&self);

    /// Number of threads currently inside `wait()` (hint, may be stale)
    fn waiter_count(&self) -> usize;
}

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(all(target_os = "linux", not(feature = "condvar-wait")))] {
        mod futex_linux;
        pub use futex_linux::FutexWaitQueue as PlatformWaitQueue;
    } else {
        mod fallback;
        pub use fallback::CondvarWaitQueue as PlatformWaitQueue;
    }
}

/// Create a new platform-appropriate wait queue
pub fn new_wait_queue() -> Box<dyn WaitQueue> {
    Box::new(PlatformWaitQueue::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn wait_for_waiters(queue: &dyn WaitQueue, n: usize) {
        let start = Instant::now();
        while queue.waiter_count() < n {
            assert!(start.elapsed() < Duration::from_secs(5), "waiters never parked");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_wait_timeout() {
        let queue = new_wait_queue();
        let seen = queue.sequence();
        let start = Instant::now();
        let moved = queue.wait(seen, Some(Duration::from_millis(50)));
        let elapsed = start.elapsed();

        assert!(!moved);
        assert!(elapsed >= Duration::from_millis(40)); // Allow some slack
    }

    #[test]
    fn test_stale_snapshot_returns_immediately() {
        let queue = new_wait_queue();
        let seen = queue.sequence();
        queue.wake_all();

        let start = Instant::now();
        assert!(queue.wait(seen, Some(Duration::from_secs(5))));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wake_all_releases_everyone() {
        let queue: Arc<PlatformWaitQueue> = Arc::new(PlatformWaitQueue::new());
        let released = Arc::new(AtomicUsize::new(0));
        let seen = queue.sequence();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let released = Arc::clone(&released);
                thread::spawn(move || {
                    while queue.sequence() == seen {
                        queue.wait(seen, Some(Duration::from_secs(10)));
                    }
                    released.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        wait_for_waiters(queue.as_ref(), 5);
        queue.wake_all();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 5);
        assert_eq!(queue.waiter_count(), 0);
    }
}
