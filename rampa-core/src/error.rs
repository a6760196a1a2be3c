use thiserror::Error;

/// Rejected run configuration. Always fatal, raised before any virtual user starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Run plan has no stages")]
    EmptyPlan,

    #[error("Stage {index} has a zero duration")]
    ZeroDuration { index: usize },

    #[error("Tick interval must be non-zero")]
    ZeroTick,

    #[error("Invalid stage `{0}`; expected `<duration>:<target>` such as `30s:100`")]
    InvalidStage(String),

    #[error("Invalid duration: {0}")]
    Duration(#[from] humantime::DurationError),

    #[error("Invalid stage target: {0}")]
    Target(#[from] std::num::ParseIntError),

    #[error("Invalid run configuration: {0}")]
    Json(#[from] serde_json::Error),
}
