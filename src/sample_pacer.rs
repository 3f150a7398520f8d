use std::time::Duration;

/// Maps elapsed wall-clock time to the number of samples that should exist
/// by then, so a late or merged timer tick still ends up at the right total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplePacer {
    sample_rate: u64,
    max_per_tick: u64,
}

impl SamplePacer {
    pub fn new(sample_rate: u64, max_per_tick: u64) -> Self {
        Self {
            sample_rate,
            max_per_tick,
        }
    }

    pub fn sample_rate(&self) -> u64 {
        self.sample_rate
    }

    /// `elapsed_us * rate / 1e6`, truncated.
    pub fn target(&self, elapsed_us: u64) -> u64 {
        let samples = u128::from(elapsed_us) * u128::from(self.sample_rate) / 1_000_000;
        u64::try_from(samples).unwrap_or(u64::MAX)
    }

    /// Samples to produce this tick: what is missing to reach the target,
    /// capped by the per-tick batch size and by `remaining` when a limit
    /// applies. Missing samples carry over to the next tick.
    pub fn samples_due(&self, elapsed_us: u64, already: u64, remaining: Option<u64>) -> u64 {
        let due = self
            .target(elapsed_us)
            .saturating_sub(already)
            .min(self.max_per_tick);
        match remaining {
            Some(remaining) => due.min(remaining),
            None => due,
        }
    }

    /// Elapsed time at which `samples` are due.
    pub fn time_for(&self, samples: u64) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let us = u128::from(samples) * 1_000_000 / u128::from(self.sample_rate);
        Duration::from_micros(u64::try_from(us).unwrap_or(u64::MAX))
    }
}
