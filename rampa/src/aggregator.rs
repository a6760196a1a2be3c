use pdatastructs::tdigest::{TDigest, K1};
use rampa_core::{AggregateStats, MetricStats, Sample};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

const TDIGEST_BACKLOG_SIZE: usize = 100;

/// Thread-safe sink for every [`Sample`] produced during a run.
///
/// All buckets sit behind a single lock so that [`Aggregator::snapshot`] sees either all or none
/// of a given `record` call.
#[derive(Debug, Default)]
pub struct Aggregator {
    buckets: Mutex<Buckets>,
}

#[derive(Debug, Default)]
struct Buckets {
    metrics: HashMap<String, Bucket>,
    total: Bucket,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sample: Sample) {
        let name = sample.metric_name();

        #[cfg(feature = "metrics")]
        report_metrics(&name, &sample);

        let mut buckets = self.lock();
        buckets.total.push(&sample);
        buckets.metrics.entry(name).or_default().push(&sample);
    }

    pub fn snapshot(&self) -> AggregateStats {
        let buckets = self.lock();
        AggregateStats {
            metrics: buckets
                .metrics
                .iter()
                .map(|(name, bucket)| (name.clone(), bucket.stats()))
                .collect(),
            total: buckets.total.stats(),
        }
    }

    pub fn reset(&self) {
        *self.lock() = Buckets::default();
    }

    // NOTE: A panic while holding the lock leaves the buckets in a valid (if incomplete) state, so
    // poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Buckets> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(feature = "metrics")]
fn report_metrics(name: &str, sample: &Sample) {
    use rampa_core::METRIC_LABELS;

    metrics::histogram!(METRIC_LABELS.latency, "metric" => name.to_string())
        .record(sample.latency_micros as f64);

    if sample.is_success() {
        metrics::counter!(METRIC_LABELS.success, "metric" => name.to_string()).increment(1);
    } else {
        metrics::counter!(METRIC_LABELS.failure, "metric" => name.to_string()).increment(1);
    }
}

#[derive(Debug)]
struct Bucket {
    count: u64,
    success: u64,
    failure: u64,
    sum: u64,
    min: u64,
    max: u64,
    latency: TDigest<K1>,
}

impl Default for Bucket {
    fn default() -> Self {
        Self {
            count: 0,
            success: 0,
            failure: 0,
            sum: 0,
            min: u64::MAX,
            max: 0,
            latency: default_tdigest(),
        }
    }
}

impl Bucket {
    fn push(&mut self, sample: &Sample) {
        let latency = sample.latency_micros;

        self.count += 1;
        if sample.is_success() {
            self.success += 1;
        } else {
            self.failure += 1;
        }
        self.sum = self.sum.saturating_add(latency);
        self.min = self.min.min(latency);
        self.max = self.max.max(latency);
        self.latency.insert(latency as f64);
    }

    fn stats(&self) -> MetricStats {
        if self.count == 0 {
            return MetricStats::default();
        }

        MetricStats {
            count: self.count,
            success: self.success,
            failure: self.failure,
            latency_sum_micros: self.sum,
            latency_min_micros: self.min,
            latency_max_micros: self.max,
            latency_p50: self.quantile(0.5),
            latency_p90: self.quantile(0.9),
            latency_p95: self.quantile(0.95),
            latency_p99: self.quantile(0.99),
        }
    }

    fn quantile(&self, q: f64) -> Duration {
        let micros = self.latency.quantile(q);

        // TDigest can hand back NaN on tiny inputs.
        let micros = if micros.is_finite() {
            micros.clamp(self.min as f64, self.max as f64)
        } else {
            warn!("Non-finite latency quantile for q={q}");
            0.
        };

        Duration::from_micros(micros.round() as u64)
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}
