// src/metrics.rs
//
// Aggregate statistics over completed trials.
// - SampleStats: Welford running mean/stddev + min/max of a series.
// - PhaseSummary: success rate, safety counts and reward stats for one phase.
// - RunSummary: training + testing summaries for a whole run.
// - percentile: linear-interpolated percentile for the multi-seed sweep.

use serde::Serialize;

use crate::sim::{Phase, TrialRecord};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SampleStats {
    n: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for SampleStats {
    fn default() -> Self {
        Self {
            n: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl SampleStats {
    /// Non-finite samples are skipped.
    pub fn push(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }
        self.n += 1;
        self.min = self.min.min(x);
        self.max = self.max.max(x);
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample standard deviation.
    pub fn stddev(&self) -> f64 {
        if self.n <= 1 {
            0.0
        } else {
            (self.m2 / (self.n as f64 - 1.0)).sqrt()
        }
    }

    pub fn min(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.max
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PhaseSummary {
    pub trials: u32,
    pub successes: u32,
    pub violations: u32,
    pub accidents: u32,
    pub steps: u64,
    pub avg_reward: SampleStats,
}

impl PhaseSummary {
    pub fn record(&mut self, record: &TrialRecord) {
        self.trials += 1;
        if record.success() {
            self.successes += 1;
        }
        self.violations += record.actions().violations();
        self.accidents += record.actions().accidents();
        self.steps += u64::try_from(record.steps()).unwrap_or(0);
        self.avg_reward.push(record.avg_reward());
    }

    /// Fraction of trials that reached the destination in time.
    pub fn success_rate(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            f64::from(self.successes) / f64::from(self.trials)
        }
    }

    /// Accidents per step taken.
    pub fn accident_rate(&self) -> f64 {
        if self.steps == 0 {
            0.0
        } else {
            f64::from(self.accidents) / self.steps as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunSummary {
    pub training: PhaseSummary,
    pub testing: PhaseSummary,
}

impl RunSummary {
    pub fn record(&mut self, record: &TrialRecord) {
        match record.phase() {
            Phase::Training => self.training.record(record),
            Phase::Testing => self.testing.record(record),
            Phase::Done => {}
        }
    }
}

/// Percentile of an ascending slice, `p` in [0, 1]; NaN when empty.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let idx = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    let w = idx - lo as f64;
    sorted[lo] * (1.0 - w) + sorted[hi] * w
}

/// (p05, p50, p95) of the finite values in `xs`.
pub fn p05_p50_p95(mut xs: Vec<f64>) -> (f64, f64, f64) {
    xs.retain(|x| x.is_finite());
    xs.sort_by(f64::total_cmp);
    (
        percentile(&xs, 0.05),
        percentile(&xs, 0.50),
        percentile(&xs, 0.95),
    )
}
