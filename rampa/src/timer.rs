use std::time::Duration;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};

pub(crate) enum Tick {
    /// A reporting period ended; carries the real time since the previous one.
    Progress(Duration),
    /// The run is over.
    Deadline,
}

/// Clock of a single run: periodic progress ticks, bounded by the run's end.
pub(crate) struct Ticker {
    interval: Interval,
    start: Instant,
    last_tick: Instant,
    deadline: Instant,
    period: Duration,
}

impl Ticker {
    /// Starts the clock now. `period` must be non-zero.
    pub fn start(period: Duration, run_for: Duration) -> Self {
        let start = Instant::now();
        let mut interval = interval_at(start + period, period);
        // A slow tick shifts later ones instead of firing a burst to catch up.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            start,
            last_tick: start,
            deadline: start + run_for,
            period,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn is_over(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Waits for the next period or the end of the run, whichever comes first.
    pub async fn tick(&mut self) -> Tick {
        tokio::select! {
            biased;
            _ = sleep_until(self.deadline) => Tick::Deadline,
            _ = self.interval.tick() => {
                // Interval reports the scheduled instant; a late tick must count its delay.
                let now = Instant::now();
                let since = now - self.last_tick;
                self.last_tick = now;
                Tick::Progress(since)
            }
        }
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "every {} for {}",
            humantime::format_duration(self.period),
            humantime::format_duration(self.deadline - self.start)
        )
    }
}
