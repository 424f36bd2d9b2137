//! Condvar-based wait queue
//!
//! Used on platforms without futex support, or on Linux with the
//! `condvar-wait` feature. The sequence lives under the mutex, so the
//! check in `wait()` and the bump in `wake_all()` cannot interleave.

use super::WaitQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub struct CondvarWaitQueue {
    sequence: Mutex<u32>,
    condvar: Condvar,
    waiters: AtomicUsize,
}

impl CondvarWaitQueue {
    pub fn new() -> Self {
        Self {
            sequence: Mutex::new(0),
            condvar: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    // A panic while holding this lock cannot leave the counter torn
    fn lock(&self) -> MutexGuard<'_, u32> {
        self.sequence.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for CondvarWaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitQueue for CondvarWaitQueue {
    fn sequence(&self) -> u32 {
        *self.lock()
    }

    fn wait(&self, seen: u32, timeout: Option<Duration>) -> bool {
        self.waiters.fetch_add(1, Ordering::SeqCst);

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.lock();

        while *guard == seen {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    guard = self
                        .condvar
                        .wait_timeout(guard, deadline - now)
                        .map(|(g, _)| g)
                        .unwrap_or_else(|e| e.into_inner().0);
                }
                None => {
                    guard = self.condvar.wait(guard).unwrap_or_else(|e| e.into_inner());
                }
            }
        }

        let moved = *guard != seen;
        drop(guard);
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        moved
    }

    fn wake_all(&self) {
        {
            let mut guard = self.lock();
            *guard = guard.wrapping_add(1);
        }
        self.condvar.notify_all();
    }

    fn waiter_count(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }
}
