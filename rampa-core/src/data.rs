use crate::UNLABELLED_METRIC;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// Sample labels. Ordered so that the derived metric name is stable.
pub type Labels = BTreeMap<String, String>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Failure,
}

/// One recorded request outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub timestamp: SystemTime,
    pub outcome: Outcome,
    pub latency_micros: u64,
    pub labels: Labels,
    pub error: Option<String>,
}

impl Sample {
    pub fn success(labels: Labels, latency: Duration) -> Self {
        Self {
            timestamp: SystemTime::now(),
            outcome: Outcome::Success,
            latency_micros: micros(latency),
            labels,
            error: None,
        }
    }

    pub fn failure(labels: Labels, latency: Duration, reason: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            outcome: Outcome::Failure,
            latency_micros: micros(latency),
            labels,
            error: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn latency(&self) -> Duration {
        Duration::from_micros(self.latency_micros)
    }

    /// Name of the bucket this sample is aggregated under, e.g. `method=GET,name=extrato`.
    pub fn metric_name(&self) -> String {
        if self.labels.is_empty() {
            return UNLABELLED_METRIC.to_string();
        }

        self.labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn micros(dur: Duration) -> u64 {
    u64::try_from(dur.as_micros()).unwrap_or(u64::MAX)
}

/// Builds [`Labels`] from `key => value` pairs.
#[macro_export]
macro_rules! labels {
    ($($k:expr => $v:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut labels = $crate::Labels::new();
        $(labels.insert($k.to_string(), $v.to_string());)*
        labels
    }};
}
