use rampa_core::RunPlan;
use std::time::Duration;

/// Maps elapsed run time to a target number of virtual users.
///
/// Within a stage the target moves linearly from the previous stage's target (0 for the first
/// stage) to the stage's own target. Once the plan is exhausted the target is 0.
#[derive(Clone, Debug)]
pub struct StageScheduler {
    plan: RunPlan,
}

impl StageScheduler {
    pub fn new(plan: RunPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    pub fn total_duration(&self) -> Duration {
        self.plan.total_duration()
    }

    pub fn max_target(&self) -> u32 {
        self.plan.max_target()
    }

    pub fn target_at(&self, elapsed: Duration) -> u32 {
        let mut from = 0;
        let mut stage_start = Duration::ZERO;

        for stage in self.plan.stages() {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                return interpolate(from, stage.target, progress);
            }

            from = stage.target;
            stage_start = stage_end;
        }

        0
    }

    /// Index of the stage running at `elapsed`, `None` once the plan is over.
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        let mut stage_end = Duration::ZERO;
        self.plan.stages().iter().position(|stage| {
            stage_end += stage.duration;
            elapsed < stage_end
        })
    }
}

fn interpolate(from: u32, to: u32, progress: f64) -> u32 {
    if from == to {
        return to;
    }

    let progress = progress.clamp(0., 1.);
    let value = from as f64 + (to as f64 - from as f64) * progress;
    value.round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampa_core::Stage;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn scheduler(stages: &[(u64, u32)]) -> StageScheduler {
        let stages = stages
            .iter()
            .map(|(d, t)| Stage::new(secs(*d), *t))
            .collect();
        StageScheduler::new(RunPlan::new(stages).unwrap())
    }

    fn rinha_profile() -> StageScheduler {
        scheduler(&[(10, 10), (30, 100), (60, 100), (30, 0)])
    }

    #[test]
    fn single_stage_ramp() {
        let s = scheduler(&[(10, 10)]);
        assert_eq!(s.target_at(secs(0)), 0);
        assert_eq!(s.target_at(secs(5)), 5);
        assert_eq!(s.target_at(millis(9_999)), 10);
        assert_eq!(s.target_at(secs(10)), 0);
        assert_eq!(s.target_at(secs(3_600)), 0);
    }

    #[test]
    fn boundaries() {
        let s = rinha_profile();
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(secs(10)), 10);
        assert_eq!(s.target_at(secs(25)), 55);
        assert_eq!(s.target_at(secs(40)), 100);
        assert_eq!(s.target_at(secs(115)), 50);
        assert_eq!(s.target_at(s.total_duration()), 0);
    }

    #[test]
    fn plateau_holds_target() {
        let s = rinha_profile();
        for ms in (40_000..100_000).step_by(250) {
            assert_eq!(s.target_at(millis(ms)), 100, "at {ms}ms");
        }
    }

    #[test]
    fn monotonic_within_stages() {
        let s = rinha_profile();
        let mut stage_start = Duration::ZERO;
        let mut from = 0;

        for stage in s.plan().stages().to_vec() {
            let mut prev = s.target_at(stage_start);
            let step = millis(100);
            let mut t = stage_start + step;
            while t < stage_start + stage.duration {
                let cur = s.target_at(t);
                if stage.target >= from {
                    assert!(cur >= prev, "ramp up regressed at {t:?}");
                } else {
                    assert!(cur <= prev, "ramp down rose at {t:?}");
                }
                assert!(cur >= from.min(stage.target) && cur <= from.max(stage.target));
                prev = cur;
                t += step;
            }
            from = stage.target;
            stage_start += stage.duration;
        }
    }

    #[test]
    fn ramp_down_to_zero_from_start_of_stage() {
        let s = scheduler(&[(1, 100), (10, 0)]);
        assert_eq!(s.target_at(secs(1)), 100);
        assert_eq!(s.target_at(secs(6)), 50);
        assert_eq!(s.target_at(millis(10_999)), 0);
    }

    #[test]
    fn stage_index() {
        let s = rinha_profile();
        assert_eq!(s.stage_index_at(secs(0)), Some(0));
        assert_eq!(s.stage_index_at(secs(10)), Some(1));
        assert_eq!(s.stage_index_at(secs(129)), Some(3));
        assert_eq!(s.stage_index_at(secs(130)), None);
        assert_eq!(s.max_target(), 100);
    }
}
