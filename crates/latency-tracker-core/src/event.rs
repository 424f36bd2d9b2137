//! Latency event records
//!
//! Structured records emitted when a tracker observes a latency above its
//! threshold. Records are handed to an [`EventSink`], which is write-only
//! and best-effort: no acknowledgement, no back-pressure on the emitter.
//!
//! `Display` renders the one-line `key=value` form consumed by external
//! introspection tooling.

use std::fmt;

use crate::constants::{MAX_STACK_TEXT, TASK_COMM_LEN};

/// Task command name, NUL-padded to `TASK_COMM_LEN` bytes
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Comm([u8; TASK_COMM_LEN]);

impl Comm {
    /// Build from a name, keeping at most `TASK_COMM_LEN - 1` bytes
    pub fn new(name: &str) -> Self {
        let mut buf = [0u8; TASK_COMM_LEN];
        let kept = truncate_utf8(name, TASK_COMM_LEN - 1);
        buf[..kept.len()].copy_from_slice(kept.as_bytes());
        Comm(buf)
    }

    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(TASK_COMM_LEN);
        // Only ever filled from a &str cut on a char boundary
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }

    pub fn as_bytes(&self) -> &[u8; TASK_COMM_LEN] {
        &self.0
    }
}

impl fmt::Display for Comm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Comm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Comm({:?})", self.as_str())
    }
}

/// Stack or path text, bounded to fit a `MAX_STACK_TEXT` byte field
#[derive(Clone, PartialEq, Eq, Default)]
pub struct StackText(String);

impl StackText {
    pub fn new(text: &str) -> Self {
        StackText(truncate_utf8(text, MAX_STACK_TEXT - 1).to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for StackText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StackText({:?})", self.0)
    }
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// One latency record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LatencyEvent {
    Wakeup {
        comm: Comm,
        pid: i32,
        delay: u64,
        flag: u32,
    },
    OffcpuSchedSwitch {
        comm: Comm,
        pid: i32,
        delay: u64,
        flag: u32,
        stack: StackText,
    },
    OffcpuSchedWakeup {
        waker_comm: Comm,
        waker_pid: i32,
        waker_stack: StackText,
        wakee_comm: Comm,
        wakee_pid: i32,
        wakee_offcpu_delay: u64,
        flag: u32,
    },
    SyscallStack {
        comm: Comm,
        pid: i32,
        start_ts: u64,
        delay: u64,
        flag: u32,
        stack: StackText,
    },
    Syscall {
        comm: Comm,
        pid: i32,
        start_ts: u64,
        delay: u64,
    },
    SyscallFd {
        comm: Comm,
        pid: i32,
        start_ts: u64,
        delay: u64,
        fd: i32,
        path: StackText,
    },
    Block {
        major: u32,
        minor: u32,
        sector: u64,
        delay: u64,
    },
    Net {
        iface: String,
        delay: u64,
        flag: u32,
        out_id: u32,
    },
    CriticalTimingStack {
        comm: Comm,
        pid: i32,
        stack: StackText,
    },
}

impl LatencyEvent {
    /// Record name as seen by introspection tooling
    pub fn name(&self) -> &'static str {
        match self {
            LatencyEvent::Wakeup { .. } => "latency_tracker_wakeup",
            LatencyEvent::OffcpuSchedSwitch { .. } => "latency_tracker_offcpu_sched_switch",
            LatencyEvent::OffcpuSchedWakeup { .. } => "latency_tracker_offcpu_sched_wakeup",
            LatencyEvent::SyscallStack { .. } => "latency_tracker_syscall_stack",
            LatencyEvent::Syscall { .. } => "latency_tracker_syscall",
            LatencyEvent::SyscallFd { .. } => "latency_tracker_syscall_fd",
            LatencyEvent::Block { .. } => "latency_tracker_block",
            LatencyEvent::Net { .. } => "latency_tracker_net",
            LatencyEvent::CriticalTimingStack { .. } => "latency_tracker_critical_timing_stack",
        }
    }

    /// Measured delay in nanoseconds, when the record carries one
    pub fn delay(&self) -> Option<u64> {
        match self {
            LatencyEvent::Wakeup { delay, .. }
            | LatencyEvent::OffcpuSchedSwitch { delay, .. }
            | LatencyEvent::SyscallStack { delay, .. }
            | LatencyEvent::Syscall { delay, .. }
            | LatencyEvent::SyscallFd { delay, .. }
            | LatencyEvent::Block { delay, .. }
            | LatencyEvent::Net { delay, .. } => Some(*delay),
            LatencyEvent::OffcpuSchedWakeup {
                wakee_offcpu_delay, ..
            } => Some(*wakee_offcpu_delay),
            LatencyEvent::CriticalTimingStack { .. } => None,
        }
    }
}

impl fmt::Display for LatencyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatencyEvent::Wakeup { comm, pid, delay, flag } => {
                write!(f, "comm={}, pid={}, delay={}, flag={}", comm, pid, delay, flag)
            }
            LatencyEvent::OffcpuSchedSwitch { comm, pid, delay, flag, stack } => write!(
                f,
                "comm={}, pid={}, delay={}, flag={}, stack={}",
                comm, pid, delay, flag, stack
            ),
            LatencyEvent::OffcpuSchedWakeup {
                waker_comm,
                waker_pid,
                waker_stack,
                wakee_comm,
                wakee_pid,
                wakee_offcpu_delay,
                flag,
            } => write!(
                f,
                "waker_comm={} ({}), wakee_comm={} ({}), wakee_offcpu_delay={}, flag={}, waker_stack={}",
                waker_comm, waker_pid, wakee_comm, wakee_pid, wakee_offcpu_delay, flag, waker_stack
            ),
            LatencyEvent::SyscallStack { comm, pid, start_ts, delay, flag, stack } => write!(
                f,
                "comm={}, pid={}, start_ts={}, delay={} flag={}, stack={}",
                comm, pid, start_ts, delay, flag, stack
            ),
            LatencyEvent::Syscall { comm, pid, start_ts, delay } => write!(
                f,
                "comm={}, pid={}, start_ts={}, delay={}",
                comm, pid, start_ts, delay
            ),
            LatencyEvent::SyscallFd { comm, pid, start_ts, delay, fd, path } => write!(
                f,
                "comm={}, pid={}, start_ts={}, delay={}, fd={}, path={}",
                comm, pid, start_ts, delay, fd, path
            ),
            LatencyEvent::Block { major, minor, sector, delay } => write!(
                f,
                "dev=({},{}), sector={}, delay={}",
                major, minor, sector, delay
            ),
            LatencyEvent::Net { iface, delay, flag, out_id } => write!(
                f,
                "iface={}, delay={}, flag={}, out_id={}",
                iface, delay, flag, out_id
            ),
            LatencyEvent::CriticalTimingStack { comm, pid, stack } => {
                write!(f, "comm={}, pid={}, stack={}", comm, pid, stack)
            }
        }
    }
}

/// Destination for latency records.
///
/// **Contract:** `emit()` must never block and never fail from the
/// emitter's point of view. A sink that cannot keep up drops records.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LatencyEvent);
}

/// Sink that writes each record through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &LatencyEvent) {
        log::info!(target: "latency_tracker", "{}: {}", event.name(), event);
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &LatencyEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comm_truncates_to_task_comm_len() {
        let comm = Comm::new("a-very-long-process-name");
        assert_eq!(comm.as_str().len(), TASK_COMM_LEN - 1);
        assert_eq!(comm.as_bytes()[TASK_COMM_LEN - 1], 0);
        assert_eq!(comm.as_str(), "a-very-long-pro");
    }

    #[test]
    fn test_stack_text_truncates_on_char_boundary() {
        let long = "é".repeat(200); // 400 bytes
        let text = StackText::new(&long);
        assert!(text.as_str().len() < MAX_STACK_TEXT);
        assert!(text.as_str().chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_wakeup_display() {
        let event = LatencyEvent::Wakeup {
            comm: Comm::new("bash"),
            pid: 42,
            delay: 1_500_000,
            flag: 1,
        };
        assert_eq!(event.to_string(), "comm=bash, pid=42, delay=1500000, flag=1");
        assert_eq!(event.name(), "latency_tracker_wakeup");
        assert_eq!(event.delay(), Some(1_500_000));
    }

    #[test]
    fn test_block_and_net_display() {
        let block = LatencyEvent::Block { major: 8, minor: 1, sector: 2048, delay: 99 };
        assert_eq!(block.to_string(), "dev=(8,1), sector=2048, delay=99");

        let net = LatencyEvent::Net { iface: "eth0".into(), delay: 5, flag: 0, out_id: 3 };
        assert_eq!(net.to_string(), "iface=eth0, delay=5, flag=0, out_id=3");
    }

    #[test]
    fn test_critical_timing_has_no_delay() {
        let event = LatencyEvent::CriticalTimingStack {
            comm: Comm::new("irq/9"),
            pid: 7,
            stack: StackText::new("do_IRQ+0x40"),
        };
        assert_eq!(event.delay(), None);
        assert_eq!(event.to_string(), "comm=irq/9, pid=7, stack=do_IRQ+0x40");
    }
}
