//! Unix signal forwarding via `sigwait`
//!
//! The signals are blocked on the calling thread (and so inherited by every
//! thread it spawns afterwards); a forwarder thread then receives them
//! synchronously with `sigwait` and runs a callback in normal thread
//! context.

use std::os::unix::thread::JoinHandleExt;
use std::thread::{self, JoinHandle};

use latency_tracker_core::error::{TrackerError, TrackerResult};
use log::{debug, warn};
use nix::sys::signal::{SigSet, Signal};

/// Block `signals` on the calling thread and return the set.
///
/// Call this early in `main`, before spawning other threads, so none of
/// them receives the signals asynchronously.
pub fn block_signals(signals: &[Signal]) -> TrackerResult<SigSet> {
    let mut set = SigSet::empty();
    for &sig in signals {
        set.add(sig);
    }
    set.thread_block()
        .map_err(|e| TrackerError::Signal(e.to_string()))?;
    Ok(set)
}

/// Handle to a running forwarder thread
pub struct SignalForwarder {
    handle: JoinHandle<()>,
}

impl SignalForwarder {
    /// Thread id, for directing a signal at the forwarder itself
    pub fn pthread(&self) -> libc::pthread_t {
        self.handle.as_pthread_t()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the forwarder to stop (after its callback returned false)
    pub fn join(self) {
        if self.handle.join().is_err() {
            warn!("signal forwarder panicked");
        }
    }
}

/// Spawn a thread that waits for signals in `set` and calls `on_signal`.
///
/// The thread keeps forwarding while `on_signal` returns true. `set` must
/// already be blocked (see [`block_signals`]) or the default disposition
/// may fire first.
pub fn spawn_signal_forwarder<F>(set: SigSet, mut on_signal: F) -> TrackerResult<SignalForwarder>
where
    F: FnMut(Signal) -> bool + Send + 'static,
{
    let handle = thread::Builder::new()
        .name("lt-signal".into())
        .spawn(move || {
            // The spawning thread may not have blocked `set` itself
            if let Err(e) = set.thread_block() {
                warn!("signal forwarder could not block its set: {}", e);
                return;
            }
            loop {
                match set.wait() {
                    Ok(sig) => {
                        debug!("forwarding {:?}", sig);
                        if !on_signal(sig) {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("sigwait failed: {}", e);
                        break;
                    }
                }
            }
        })
        .map_err(|e| TrackerError::WorkerSpawn(e.to_string()))?;

    Ok(SignalForwarder { handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::pthread::pthread_kill;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_forwarder_receives_thread_directed_signal() {
        let set = block_signals(&[Signal::SIGUSR2]).unwrap();
        let (tx, rx) = mpsc::channel();

        let forwarder = spawn_signal_forwarder(set, move |sig| {
            let _ = tx.send(sig);
            false
        })
        .unwrap();

        pthread_kill(forwarder.pthread(), Signal::SIGUSR2).unwrap();

        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(got, Signal::SIGUSR2);
        forwarder.join();
    }
}
