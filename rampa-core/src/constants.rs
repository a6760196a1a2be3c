use std::time::Duration;

/// How often the run driver re-evaluates the stage target.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Pause between two iterations of a single virtual user.
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(100);

/// How long stopping users may keep in-flight requests open once the run is cancelled.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Failure reason recorded for requests abandoned after the grace period.
pub const CANCELLED_REASON: &str = "cancelled";

/// Metric name used for samples carrying no labels.
pub const UNLABELLED_METRIC: &str = "default";
