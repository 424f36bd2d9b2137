//! Linux futex-based wait queue
//!
//! The futex word is the sequence counter itself:
//!
//! When a thread waits:
//! 1. Increment waiter count
//! 2. FUTEX_WAIT on the word (kernel blocks only if word == seen)
//! 3. Decrement waiter count on return
//!
//! When waking:
//! 1. Increment the word
//! 2. FUTEX_WAKE all waiters if any are counted
//!
//! Both sides use SeqCst so that either the waker sees the waiter count or
//! the waiter's FUTEX_WAIT sees the new word and returns EAGAIN.

use super::WaitQueue;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// Linux futex wait queue
pub struct FutexWaitQueue {
    /// Futex word: wake sequence
    futex: AtomicU32,

    /// Threads currently inside `wait()`
    waiters: AtomicUsize,
}

impl FutexWaitQueue {
    pub fn new() -> Self {
        Self {
            futex: AtomicU32::new(0),
            waiters: AtomicUsize::new(0),
        }
    }
}

impl Default for FutexWaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitQueue for FutexWaitQueue {
    fn sequence(&self) -> u32 {
        self.futex.load(Ordering::SeqCst)
    }

    fn wait(&self, seen: u32, timeout: Option<Duration>) -> bool {
        self.waiters.fetch_add(1, Ordering::SeqCst);

        if self.futex.load(Ordering::SeqCst) != seen {
            self.waiters.fetch_sub(1, Ordering::SeqCst);
            return true;
        }

        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });

        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // FUTEX_WAIT: sleep if futex == seen. The result is not inspected:
        // ETIMEDOUT, EAGAIN and EINTR all mean "re-read the word".
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                seen,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            );
        }

        self.waiters.fetch_sub(1, Ordering::SeqCst);
        self.futex.load(Ordering::SeqCst) != seen
    }

    fn wake_all(&self) {
        self.futex.fetch_add(1, Ordering::SeqCst);

        if self.waiters.load(Ordering::SeqCst) == 0 {
            return;
        }

        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                i32::MAX,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }

    fn waiter_count(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }
}
