//! Kernel-style stderr backend for the `log` facade
//!
//! Library code logs through `log::{error, warn, info, debug, trace}`.
//! This module provides the default backend: thread-safe, line-atomic
//! stderr output with printk-like level prefixes and optional flushing.
//!
//! # Environment Variables
//!
//! - `LT_FLUSH_EPRINT=1` - Flush stderr after each line (useful when chasing hangs)
//! - `LT_LOG_LEVEL=<level>` - off, error, warn, info, debug, trace (or 0-5)
//!
//! # Usage
//!
//! ```ignore
//! latency_tracker_core::kprint::init();
//! log::info!("tracker {} registered", name);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use log::{Level, LevelFilter, Log, Metadata, Record};

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(3);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

static LOGGER: StderrLogger = StderrLogger;

/// `log::Log` implementation writing to stderr
pub struct StderrLogger;

fn level_from_u8(v: u8) -> LevelFilter {
    match v {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn level_to_u8(level: LevelFilter) -> u8 {
    match level {
        LevelFilter::Off => 0,
        LevelFilter::Error => 1,
        LevelFilter::Warn => 2,
        LevelFilter::Info => 3,
        LevelFilter::Debug => 4,
        LevelFilter::Trace => 5,
    }
}

/// Parse a level name or number as accepted by `LT_LOG_LEVEL`
pub fn parse_level(val: &str) -> Option<LevelFilter> {
    match val.to_lowercase().as_str() {
        "off" | "0" => Some(LevelFilter::Off),
        "error" | "1" => Some(LevelFilter::Error),
        "warn" | "2" => Some(LevelFilter::Warn),
        "info" | "3" => Some(LevelFilter::Info),
        "debug" | "4" => Some(LevelFilter::Debug),
        "trace" | "5" => Some(LevelFilter::Trace),
        _ => None,
    }
}

fn prefix(level: Level) -> &'static str {
    match level {
        Level::Error => "[ERROR]",
        Level::Warn => "[WARN] ",
        Level::Info => "[INFO] ",
        Level::Debug => "[DEBUG]",
        Level::Trace => "[TRACE]",
    }
}

/// Install the stderr logger and apply environment settings.
///
/// Safe to call more than once. If another logger is already installed
/// the environment settings are still applied to this module's filter.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    if let Ok(val) = std::env::var("LT_FLUSH_EPRINT") {
        let flush = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        FLUSH_ENABLED.store(flush, Ordering::Relaxed);
    }

    if let Some(level) = std::env::var("LT_LOG_LEVEL").ok().and_then(|v| parse_level(&v)) {
        LOG_LEVEL.store(level_to_u8(level), Ordering::Relaxed);
    }

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log_level());
    }
}

/// Current level of this backend
#[inline]
pub fn log_level() -> LevelFilter {
    level_from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically
pub fn set_log_level(level: LevelFilter) {
    LOG_LEVEL.store(level_to_u8(level), Ordering::Relaxed);
    log::set_max_level(level);
}

/// Set flush mode programmatically
pub fn set_flush_enabled(enabled: bool) {
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        let _ = writeln!(
            handle,
            "{} {}: {}",
            prefix(record.level()),
            record.target(),
            record.args()
        );
        if FLUSH_ENABLED.load(Ordering::Relaxed) {
            let _ = handle.flush();
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("off"), Some(LevelFilter::Off));
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::Debug));
        assert_eq!(parse_level("5"), Some(LevelFilter::Trace));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_level_round_trip_through_u8() {
        for level in [LevelFilter::Off, LevelFilter::Warn, LevelFilter::Trace] {
            assert_eq!(level_from_u8(level_to_u8(level)), level);
        }
        assert_eq!(level_from_u8(99), LevelFilter::Trace);
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
        set_log_level(LevelFilter::Off);
        log::error!("suppressed");
        assert_eq!(log_level(), LevelFilter::Off);
    }
}
