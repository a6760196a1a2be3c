use crate::{ConfigError, DEFAULT_GRACE_PERIOD, DEFAULT_PAUSE, DEFAULT_TICK};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

/// A time window with a target number of virtual users at its end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "human_duration")]
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// Parses `<duration>:<target>`, e.g. `1m30s:100`.
impl FromStr for Stage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (duration, target) = s
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::InvalidStage(s.to_string()))?;
        let duration = humantime::parse_duration(duration.trim())?;
        let target = target.trim().parse()?;
        Ok(Self { duration, target })
    }
}

/// Validated, ordered list of stages. Read-only once a run starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunPlan {
    stages: Vec<Stage>,
}

impl RunPlan {
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptyPlan);
        }

        if let Some(index) = stages.iter().position(|s| s.duration.is_zero()) {
            return Err(ConfigError::ZeroDuration { index });
        }

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn max_target(&self) -> u32 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }
}

impl TryFrom<Vec<Stage>> for RunPlan {
    type Error = ConfigError;

    fn try_from(stages: Vec<Stage>) -> Result<Self, Self::Error> {
        Self::new(stages)
    }
}

/// Serializable description of a whole run.
///
/// Durations are written the human way (`"10s"`, `"1m"`), e.g.
///
/// ```json
/// {
///   "stages": [
///     { "duration": "10s", "target": 10 },
///     { "duration": "30s", "target": 100 }
///   ],
///   "pause": "100ms"
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub stages: Vec<Stage>,
    #[serde(default = "default_pause", with = "human_duration")]
    pub pause: Duration,
    #[serde(default = "default_tick", with = "human_duration")]
    pub tick: Duration,
    #[serde(default = "default_grace_period", with = "human_duration")]
    pub grace_period: Duration,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub rps: Option<NonZeroU32>,
}

impl RunConfig {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            pause: DEFAULT_PAUSE,
            tick: DEFAULT_TICK,
            grace_period: DEFAULT_GRACE_PERIOD,
            seed: None,
            rps: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validates the whole configuration and returns its stage plan.
    pub fn plan(&self) -> Result<RunPlan, ConfigError> {
        if self.tick.is_zero() {
            return Err(ConfigError::ZeroTick);
        }
        RunPlan::new(self.stages.clone())
    }
}

fn default_pause() -> Duration {
    DEFAULT_PAUSE
}

fn default_tick() -> Duration {
    DEFAULT_TICK
}

fn default_grace_period() -> Duration {
    DEFAULT_GRACE_PERIOD
}

mod human_duration {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(dur: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*dur))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}
