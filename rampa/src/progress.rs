use metrics_util::AtomicBucket;
use pdatastructs::tdigest::{TDigest, K1};
use rampa_core::Sample;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::error;

const TDIGEST_BACKLOG_SIZE: usize = 100;

/// Lock-free counters drained once per tick to report live progress.
pub(crate) struct TickCounters {
    success: AtomicU64,
    failure: AtomicU64,
    iterations: AtomicU64,
    total_iterations: AtomicU64,
    latency: AtomicBucket<Duration>,
}

impl TickCounters {
    pub fn new() -> Self {
        Self {
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            iterations: AtomicU64::new(0),
            total_iterations: AtomicU64::new(0),
            latency: AtomicBucket::new(),
        }
    }

    pub fn record(&self, sample: &Sample) {
        if sample.is_success() {
            self.success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure.fetch_add(1, Ordering::Relaxed);
        }
        self.latency.push(sample.latency());
    }

    pub fn iteration_done(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        self.total_iterations.fetch_add(1, Ordering::Relaxed);
    }

    /// Iterations completed since creation; not reset by [`TickCounters::collect`].
    pub fn total_iterations(&self) -> u64 {
        self.total_iterations.load(Ordering::Relaxed)
    }

    pub fn collect(&self, elapsed: Duration) -> TickMeasurement {
        let success = self.success.swap(0, Ordering::Relaxed);
        let failure = self.failure.swap(0, Ordering::Relaxed);
        let iterations = self.iterations.swap(0, Ordering::Relaxed);
        let mut measurement = TickMeasurement::new(success, failure, iterations, elapsed);
        self.latency
            .clear_with(|dur| measurement.populate_latencies(dur));
        measurement
    }
}

/// Throughput and latency observed during a single tick.
#[derive(Debug, Clone)]
pub(crate) struct TickMeasurement {
    pub rps: f64,
    pub error_rate: f64,
    pub requests: u64,
    pub iterations: u64,
    latency: TDigest<K1>,
}

impl TickMeasurement {
    fn new(success: u64, failure: u64, iterations: u64, elapsed: Duration) -> Self {
        let requests = success + failure;
        let secs = elapsed.as_secs_f64();
        let rps = if secs > 0. { requests as f64 / secs } else { 0. };
        let error_rate = if requests > 0 {
            failure as f64 / requests as f64
        } else {
            0.
        };
        Self {
            rps,
            error_rate,
            requests,
            iterations,
            latency: default_tdigest(),
        }
    }

    fn populate_latencies(&mut self, dur: &[Duration]) {
        for latency in dur {
            self.latency.insert(latency.as_secs_f64());
        }
    }

    pub fn latency(&self, quantile: f64) -> Duration {
        if self.requests == 0 {
            return Duration::ZERO;
        }

        let secs = self.latency.quantile(quantile);
        let secs = if secs.is_finite() && secs >= 0. {
            secs
        } else {
            error!("Non-finite latency quantile for q={quantile}");
            0.
        };

        Duration::from_secs_f64(secs)
    }
}

impl fmt::Display for TickMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RPS={:.2}, ErrorRate={:.2}, Iterations={}, p50={:?}, p90={:?}, p99={:?}",
            self.rps,
            self.error_rate,
            self.iterations,
            self.latency(0.5),
            self.latency(0.90),
            self.latency(0.99),
        )
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}
