//! Audio/sentence drift detection and correction policy for the synchronizer.
//!
//! Pure and wall-clock-free: the caller supplies `elapsed_since_last_correction`
//! on each sample rather than this type reading `Instant::now()` itself, so the
//! whole correction policy can be driven deterministically in tests.

use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftDecision {
    NoAction,
    /// Apply this many milliseconds as an additive offset to the synchronizer's
    /// internal position accounting. Never seeks the player.
    Correct { offset_ms: i64 },
}

/// Tracks a bounded history of drift samples and decides when to correct.
#[derive(Debug, Clone)]
pub struct DriftTracker {
    samples: VecDeque<i64>,
    capacity: usize,
    alpha: f64,
    smoothed_ms: f64,
    threshold_ms: i64,
    backoff: Duration,
    multiplier: f64,
    successive_corrections: u32,
}

pub const DEFAULT_CAPACITY: usize = 20;
pub const DEFAULT_ALPHA: f64 = 0.3;
pub const DEFAULT_THRESHOLD_MS: i64 = 200;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

impl Default for DriftTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_ALPHA, DEFAULT_THRESHOLD_MS, DEFAULT_BACKOFF)
    }
}

impl DriftTracker {
    pub fn new(capacity: usize, alpha: f64, threshold_ms: i64, backoff: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            alpha,
            smoothed_ms: 0.0,
            threshold_ms,
            backoff,
            multiplier: 1.0,
            successive_corrections: 0,
        }
    }

    /// Records a raw drift sample (player position minus expected position, in
    /// milliseconds) and returns whether a correction should be applied now.
    pub fn record(&mut self, raw_drift_ms: i64, elapsed_since_last_correction: Duration) -> DriftDecision {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(raw_drift_ms);
        self.smoothed_ms = self.alpha * raw_drift_ms as f64 + (1.0 - self.alpha) * self.smoothed_ms;

        let exceeds = self.smoothed_ms.abs() >= self.threshold_ms as f64;
        let backoff_elapsed = elapsed_since_last_correction >= self.backoff.mul_f64(self.multiplier);
        let agrees = self.last_three_agree();

        if exceeds && backoff_elapsed && agrees {
            let offset_ms = (self.smoothed_ms / 2.0).round() as i64;
            self.successive_corrections += 1;
            if self.successive_corrections >= 3 {
                self.multiplier = (self.multiplier * 1.5).min(10.0);
                self.successive_corrections = 0;
            }
            DriftDecision::Correct { offset_ms }
        } else {
            if !exceeds {
                self.successive_corrections = 0;
                self.multiplier = 1.0_f64.max(self.multiplier * 0.9);
            }
            DriftDecision::NoAction
        }
    }

    fn last_three_agree(&self) -> bool {
        if self.samples.len() < 3 {
            return false;
        }
        let mut it = self.samples.iter().rev().take(3).map(|v| v.signum());
        let a = it.next().unwrap();
        let b = it.next().unwrap();
        let c = it.next().unwrap();
        a != 0 && a == b && b == c
    }

    pub fn average_abs_drift_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: i64 = self.samples.iter().map(|v| v.abs()).sum();
        sum as f64 / self.samples.len() as f64
    }

    pub fn max_abs_drift_ms(&self) -> i64 {
        self.samples.iter().map(|v| v.abs()).max().unwrap_or(0)
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }
}
