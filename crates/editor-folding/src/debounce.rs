//! Adaptive update delay.

use std::collections::VecDeque;
use std::time::Duration;

/// Number of samples in the sliding window.
pub const DEBOUNCE_WINDOW: usize = 6;

/// Sliding-window average of computation latency, used as the debounce delay.
///
/// Slow providers get a longer delay, so bursts of edits coalesce into fewer computations.
#[derive(Debug, Clone)]
pub struct DebounceInfo {
    samples: VecDeque<Duration>,
    min: Duration,
    max: Duration,
}

impl DebounceInfo {
    /// Create an empty window bounded to `[min, max]`.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(DEBOUNCE_WINDOW),
            min,
            max: max.max(min),
        }
    }

    /// Change the bounds, keeping the samples.
    pub fn set_bounds(&mut self, min: Duration, max: Duration) {
        self.min = min;
        self.max = max.max(min);
    }

    /// Current delay: the sample average clamped to the bounds (`min` while empty).
    pub fn delay(&self) -> Duration {
        if self.samples.is_empty() {
            return self.min;
        }
        let total: Duration = self.samples.iter().sum();
        let average = total / self.samples.len() as u32;
        average.clamp(self.min, self.max)
    }

    /// Record a computation latency and return the new delay.
    pub fn update(&mut self, elapsed: Duration) -> Duration {
        if self.samples.len() == DEBOUNCE_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed);
        self.delay()
    }
}
