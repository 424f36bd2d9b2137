//! Stress test - many producers signalling one wakeup pipe
//!
//! Producers call `notify()` in a tight loop while readers block on the
//! pipe. Checks that the rate limiter bounds delivered wakes, that every
//! wake episode has exactly one observer, and that teardown releases every
//! reader.
//!
//! Usage: stress [producers] [readers] [seconds] [rate_limit_ms]

use latency_tracker::{Registry, TrackerConfig, WaitOutcome};
use log::{error, info};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn arg<T: std::str::FromStr>(n: usize, default: T) -> T {
    std::env::args()
        .nth(n)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn main() {
    latency_tracker::init_logging();

    let producers: usize = arg(1, 8);
    let readers: usize = arg(2, 4);
    let seconds: u64 = arg(3, 3);
    let rate_limit_ms: u64 = arg(4, 10);

    println!("=== Latency Tracker Stress Test ===\n");
    println!("Producers:  {}", producers);
    println!("Readers:    {}", readers);
    println!("Duration:   {}s", seconds);
    println!("Rate limit: {}ms\n", rate_limit_ms);

    let config = TrackerConfig::from_env()
        .root_name("latency-stress")
        .rate_limit(Duration::from_millis(rate_limit_ms));

    let registry = match Registry::setup(config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("setup failed: {}", e);
            std::process::exit(1);
        }
    };

    let tracker = match registry
        .add_tracker("stress")
        .and_then(|t| t.enable_wakeup_pipe().map(|_| t))
    {
        Ok(t) => t,
        Err(e) => {
            eprintln!("tracker setup failed: {}", e);
            std::process::exit(1);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let alerts = Arc::new(AtomicU64::new(0));
    let observed = Arc::new(AtomicU64::new(0));
    let closed = Arc::new(AtomicU64::new(0));
    let signals = Arc::new(AtomicU64::new(0));

    let mut reader_threads = Vec::with_capacity(readers);
    for i in 0..readers {
        let handle = match tracker.open_wakeup_pipe() {
            Ok(h) => h,
            Err(e) => {
                eprintln!("open failed: {}", e);
                std::process::exit(1);
            }
        };
        let (alerts, observed, closed) = (alerts.clone(), observed.clone(), closed.clone());
        reader_threads.push(
            thread::Builder::new()
                .name(format!("reader-{}", i))
                .spawn(move || loop {
                    match handle.wait_for_alert() {
                        WaitOutcome::Alert { observed: seen } => {
                            alerts.fetch_add(1, Ordering::Relaxed);
                            if seen {
                                observed.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        WaitOutcome::Closed => {
                            closed.fetch_add(1, Ordering::Relaxed);
                            break;
                        }
                        WaitOutcome::Interrupted | WaitOutcome::TimedOut => break,
                    }
                })
                .expect("spawn reader"),
        );
    }

    let start = Instant::now();
    let mut producer_threads = Vec::with_capacity(producers);
    for i in 0..producers {
        let (tracker, stop, signals) = (tracker.clone(), stop.clone(), signals.clone());
        producer_threads.push(
            thread::Builder::new()
                .name(format!("producer-{}", i))
                .spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        tracker.notify();
                        signals.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .expect("spawn producer"),
        );
    }

    while start.elapsed() < Duration::from_secs(seconds) {
        print!(
            "\rSignals: {:>12}  Alerts: {:>8}",
            signals.load(Ordering::Relaxed),
            alerts.load(Ordering::Relaxed)
        );
        thread::sleep(Duration::from_millis(200));
    }
    stop.store(true, Ordering::Relaxed);
    for t in producer_threads {
        let _ = t.join();
    }
    let elapsed = start.elapsed();

    let pipe = tracker.wakeup_pipe();
    if let Some(pipe) = &pipe {
        pipe.flush();
    }
    let stats = pipe.as_ref().map(|p| p.stats()).unwrap_or_default();

    // Teardown releases every blocked reader with Closed
    registry.cleanup();
    for t in reader_threads {
        let _ = t.join();
    }

    let max_wakes = elapsed.as_millis() as u64 / rate_limit_ms.max(1) + 1;

    println!("\n\n=== Results ===");
    println!("Signals:        {}", signals.load(Ordering::Relaxed));
    println!("Rate limited:   {}", stats.rate_limited);
    println!("Coalesced:      {}", stats.coalesced);
    println!("Delivered:      {}", stats.delivered);
    println!("Wake episodes:  {} (bound {})", stats.wakes, max_wakes);
    println!("Reader alerts:  {}", alerts.load(Ordering::Relaxed));
    println!("Observers:      {}", observed.load(Ordering::Relaxed));
    println!("Closed readers: {}/{}", closed.load(Ordering::Relaxed), readers);

    info!(
        "stress: {} signals in {:?}, {} wakes (bound {}), {} observers, {}/{} readers closed",
        signals.load(Ordering::Relaxed),
        elapsed,
        stats.wakes,
        max_wakes,
        observed.load(Ordering::Relaxed),
        closed.load(Ordering::Relaxed),
        readers
    );

    let ok = (rate_limit_ms == 0 || stats.wakes <= max_wakes)
        && observed.load(Ordering::Relaxed) <= stats.wakes
        && closed.load(Ordering::Relaxed) == readers as u64;
    if ok {
        println!("\n=== Stress Test Passed ===");
    } else {
        error!("stress: invariant check failed");
        println!("\n=== Stress Test FAILED ===");
        std::process::exit(1);
    }
}
