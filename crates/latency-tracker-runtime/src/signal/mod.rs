//! Signal forwarding
//!
//! Turns asynchronous process signals (SIGINT from a terminal, SIGTERM from
//! a supervisor) into ordinary calls on a dedicated thread, where it is
//! legal to take locks and wake waiters. Readers blocked on a wakeup pipe
//! are interrupted this way.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    }
}
