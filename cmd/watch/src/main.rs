//! Watch a tracker's wakeup pipe
//!
//! Sets up a registry with one tracker, feeds it synthetic wakeup-latency
//! events from a producer thread, and blocks on the wakeup pipe printing
//! each alert. Ctrl-C interrupts the blocked read and shuts down cleanly.
//!
//! Usage: watch [tracker] [event_interval_ms]

use latency_tracker::signal::{block_signals, spawn_signal_forwarder};
use latency_tracker::{Comm, LatencyEvent, Registry, TrackerConfig, TrackerError};
use log::info;
use nix::sys::signal::Signal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() {
    latency_tracker::init_logging();

    // Before any thread exists, so every thread inherits the mask
    let set = match block_signals(&[Signal::SIGINT, Signal::SIGTERM]) {
        Ok(set) => set,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let name = std::env::args().nth(1).unwrap_or_else(|| "sched".to_string());
    let interval_ms: u64 = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(250);

    let config = TrackerConfig::from_env();
    let registry = match Registry::setup(config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("setup failed: {}", e);
            std::process::exit(1);
        }
    };

    let tracker = match registry.add_tracker(&name) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    tracker.set_threshold(1_000_000);

    let pipe_path = match tracker.enable_wakeup_pipe() {
        Ok(_) => format!("{}/{}", tracker.path(), latency_tracker::constants::WAKEUP_PIPE_ENTRY),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let reader = match registry.namespace().open_pipe(&pipe_path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let interrupter = reader.interrupter();
    let forwarder = match spawn_signal_forwarder(set, move |sig| {
        info!("received {:?}, interrupting reader", sig);
        interrupter.interrupt();
        false
    }) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let producer = {
        let (tracker, stop) = (tracker.clone(), stop.clone());
        thread::spawn(move || {
            let mut delay = 500_000u64;
            while !stop.load(Ordering::Relaxed) {
                // Cheap deterministic jitter around the threshold
                delay = (delay * 7 + 300_000) % 3_000_000;
                if tracker.params().exceeds_threshold(delay) {
                    let event = LatencyEvent::Wakeup {
                        comm: Comm::new("watch-producer"),
                        pid: std::process::id() as i32,
                        delay,
                        flag: 0,
                    };
                    tracker.report(&event);
                }
                thread::sleep(Duration::from_millis(interval_ms));
            }
        })
    };

    println!("Watching {} (Ctrl-C to stop)", pipe_path);
    let start = Instant::now();
    let mut alerts = 0u64;
    let mut buf = [0u8; 1];
    let interrupted = loop {
        match reader.read(&mut buf) {
            Ok(_) => {
                alerts += 1;
                println!(
                    "[{:>8.3}s] alert #{} on {}",
                    start.elapsed().as_secs_f64(),
                    alerts,
                    tracker.name()
                );
            }
            Err(TrackerError::Interrupted) => break true,
            Err(TrackerError::PipeClosed(_)) => {
                info!("{} closed", pipe_path);
                break false;
            }
            Err(e) => {
                eprintln!("read failed: {}", e);
                break false;
            }
        }
    };

    stop.store(true, Ordering::Relaxed);
    let _ = producer.join();
    if interrupted {
        forwarder.join();
    }

    if let Some(pipe) = tracker.wakeup_pipe() {
        let stats = pipe.stats();
        println!(
            "\n{} alerts: {} delivered, {} rate limited, {} coalesced",
            alerts, stats.delivered, stats.rate_limited, stats.coalesced
        );
    }
    drop(reader);
    registry.cleanup();
}
