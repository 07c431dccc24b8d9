//! Pipeline counters and the iteration report channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam::utils::CachePadded;
use flume::Receiver;
use tracing::info;

/// Shared counters for the control loop.
///
/// Written by the controller, read by whoever holds a clone of the
/// `Arc` (the stats logger, integration tests).
#[derive(Default)]
pub struct PipelineStats {
    frames_processed: CachePadded<AtomicU64>,
    frames_transmitted: CachePadded<AtomicU64>,
    fetch_timeouts: CachePadded<AtomicU64>,
    source_reconnects: CachePadded<AtomicU64>,
    package_failures: CachePadded<AtomicU64>,
    transmit_failures: CachePadded<AtomicU64>,
    paused_iterations: CachePadded<AtomicU64>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_processed: u64,
    pub frames_transmitted: u64,
    pub fetch_timeouts: u64,
    pub source_reconnects: u64,
    pub package_failures: u64,
    pub transmit_failures: u64,
    pub paused_iterations: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_step(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("kinesis_frames_processed_total").increment(1);
    }

    pub fn record_transmit(&self) {
        self.frames_transmitted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("kinesis_frames_transmitted_total").increment(1);
    }

    pub fn record_fetch_timeout(&self) {
        self.fetch_timeouts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("kinesis_fetch_timeouts_total").increment(1);
    }

    pub fn record_reconnect(&self) {
        self.source_reconnects.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("kinesis_source_reconnects_total").increment(1);
    }

    pub fn record_package_failure(&self) {
        self.package_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("kinesis_package_failures_total").increment(1);
    }

    pub fn record_transmit_failure(&self) {
        self.transmit_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("kinesis_transmit_failures_total").increment(1);
    }

    pub fn record_paused_iteration(&self) {
        self.paused_iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_transmitted: self.frames_transmitted.load(Ordering::Relaxed),
            fetch_timeouts: self.fetch_timeouts.load(Ordering::Relaxed),
            source_reconnects: self.source_reconnects.load(Ordering::Relaxed),
            package_failures: self.package_failures.load(Ordering::Relaxed),
            transmit_failures: self.transmit_failures.load(Ordering::Relaxed),
            paused_iterations: self.paused_iterations.load(Ordering::Relaxed),
        }
    }
}

/// Per-iteration timing sample from the control loop.
#[derive(Debug, Clone, Copy)]
pub struct IterationReport {
    /// Wall time of the estimation step alone.
    pub proc: Duration,
    /// Wall time of the whole iteration.
    pub total: Duration,
    pub transmitted: bool,
    pub paused: bool,
}

/// Drain iteration reports and log an aggregate line periodically.
///
/// Runs until the report channel's senders are gone.
pub async fn report_logger(rx: Receiver<IterationReport>, every: Duration) {
    let mut window_start = tokio::time::Instant::now();
    let mut iterations = 0u64;
    let mut transmitted = 0u64;
    let mut proc_sum = Duration::ZERO;

    while let Ok(report) = rx.recv_async().await {
        iterations += 1;
        if report.transmitted {
            transmitted += 1;
        }
        if !report.paused {
            proc_sum += report.proc;
            metrics::histogram!("kinesis_estimation_ms")
                .record(report.proc.as_secs_f64() * 1e3);
        }
        metrics::histogram!("kinesis_iteration_ms").record(report.total.as_secs_f64() * 1e3);

        if window_start.elapsed() >= every && iterations > 0 {
            let avg_proc = proc_sum.as_secs_f64() * 1e3 / iterations as f64;
            let fps = iterations as f64 / window_start.elapsed().as_secs_f64();
            info!(
                "pipeline: {fps:.1} iter/s, {transmitted}/{iterations} transmitted, \
                 avg estimation {avg_proc:.2} ms"
            );
            window_start = tokio::time::Instant::now();
            iterations = 0;
            transmitted = 0;
            proc_sum = Duration::ZERO;
        }
    }
}
