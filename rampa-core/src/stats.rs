use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Running statistics of one metric bucket.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricStats {
    pub count: u64,
    pub success: u64,
    pub failure: u64,
    pub latency_sum_micros: u64,
    pub latency_min_micros: u64,
    pub latency_max_micros: u64,
    pub latency_p50: Duration,
    pub latency_p90: Duration,
    pub latency_p95: Duration,
    pub latency_p99: Duration,
}

impl MetricStats {
    pub fn error_rate(&self) -> f64 {
        if self.count == 0 {
            0.
        } else {
            self.failure as f64 / self.count as f64
        }
    }

    pub fn mean_latency(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(self.latency_sum_micros / self.count)
        }
    }

    pub fn min_latency(&self) -> Duration {
        Duration::from_micros(self.latency_min_micros)
    }

    pub fn max_latency(&self) -> Duration {
        Duration::from_micros(self.latency_max_micros)
    }
}

impl fmt::Display for MetricStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "count={} ok={} failed={} ({:.2}%) avg={:?} min={:?} max={:?} p50={:?} p90={:?} p95={:?} p99={:?}",
            self.count,
            self.success,
            self.failure,
            self.error_rate() * 100.,
            self.mean_latency(),
            self.min_latency(),
            self.max_latency(),
            self.latency_p50,
            self.latency_p90,
            self.latency_p95,
            self.latency_p99,
        )
    }
}

/// Point-in-time copy of every metric bucket, plus the overall totals.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateStats {
    pub metrics: BTreeMap<String, MetricStats>,
    pub total: MetricStats,
}

impl AggregateStats {
    pub fn get(&self, name: &str) -> Option<&MetricStats> {
        self.metrics.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.total.count == 0
    }
}

/// Summary returned when a load test finishes.
#[derive(Clone, Debug, Default)]
pub struct RunStatistics {
    pub elapsed: Duration,
    pub peak_users: usize,
    pub iterations: u64,
    pub stats: AggregateStats,
}

impl RunStatistics {
    pub fn requests_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0. {
            0.
        } else {
            self.stats.total.count as f64 / secs
        }
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "elapsed={:.1?} peak_users={} iterations={} rps={:.2}",
            self.elapsed,
            self.peak_users,
            self.iterations,
            self.requests_per_second(),
        )?;
        for (name, stats) in &self.stats.metrics {
            writeln!(f, "  {name}: {stats}")?;
        }
        write!(f, "  total: {}", self.stats.total)
    }
}
