//! Rolling count-rate statistics.
//!
//! Each [`RollingWindow`] keeps the samples of the last `duration`, measured
//! from the most recent submission. Average, minimum and maximum are kept
//! incrementally so long windows (90 days at one sample per second) cost
//! O(1) amortised per submission.

use crate::codec::DecodeError;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One count-rate sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSample {
    pub timestamp: Instant,
    pub rate_cpm: f64,
}

/// Statistics over the samples currently held by a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Snapshot of one window. `stats` is `None` when the window holds no
/// samples, which is distinct from a window full of zero readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReport {
    pub duration: Duration,
    pub samples: usize,
    pub stats: Option<WindowStats>,
}

/// Duration-bounded sample window.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    duration: Duration,
    samples: VecDeque<WindowSample>,
    sum: f64,
    // Candidates for the minimum/maximum, oldest first. Values are
    // increasing in `minima` and decreasing in `maxima`.
    minima: VecDeque<WindowSample>,
    maxima: VecDeque<WindowSample>,
}

impl RollingWindow {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            samples: VecDeque::new(),
            sum: 0.0,
            minima: VecDeque::new(),
            maxima: VecDeque::new(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &WindowSample> {
        self.samples.iter()
    }

    fn expired(&self, sample: &WindowSample, latest: Instant) -> bool {
        latest.saturating_duration_since(sample.timestamp) > self.duration
    }

    fn evict(&mut self, latest: Instant) {
        while let Some(front) = self.samples.front() {
            if !self.expired(front, latest) {
                break;
            }
            self.sum -= front.rate_cpm;
            self.samples.pop_front();
        }
        while self.minima.front().is_some_and(|s| self.expired(s, latest)) {
            self.minima.pop_front();
        }
        while self.maxima.front().is_some_and(|s| self.expired(s, latest)) {
            self.maxima.pop_front();
        }
        if self.samples.is_empty() {
            // drop accumulated rounding error
            self.sum = 0.0;
        }
    }

    fn push(&mut self, sample: WindowSample) {
        self.evict(sample.timestamp);

        self.sum += sample.rate_cpm;
        self.samples.push_back(sample);

        while self
            .minima
            .back()
            .is_some_and(|s| s.rate_cpm >= sample.rate_cpm)
        {
            self.minima.pop_back();
        }
        self.minima.push_back(sample);

        while self
            .maxima
            .back()
            .is_some_and(|s| s.rate_cpm <= sample.rate_cpm)
        {
            self.maxima.pop_back();
        }
        self.maxima.push_back(sample);
    }

    /// Average, minimum and maximum of the retained samples.
    pub fn stats(&self) -> Option<WindowStats> {
        let min = self.minima.front()?.rate_cpm;
        let max = self.maxima.front()?.rate_cpm;
        Some(WindowStats {
            avg: self.sum / self.samples.len() as f64,
            min,
            max,
        })
    }

    pub fn report(&self) -> WindowReport {
        WindowReport {
            duration: self.duration,
            samples: self.samples.len(),
            stats: self.stats(),
        }
    }
}

/// Set of rolling windows fed from a single sample stream.
#[derive(Debug, Clone)]
pub struct StatAggregator {
    windows: Vec<RollingWindow>,
    latest: Option<Instant>,
}

impl StatAggregator {
    /// Create an aggregator with one window per distinct duration.
    pub fn new(durations: impl IntoIterator<Item = Duration>) -> Self {
        let mut durations: Vec<Duration> = durations.into_iter().collect();
        durations.sort();
        durations.dedup();

        Self {
            windows: durations.into_iter().map(RollingWindow::new).collect(),
            latest: None,
        }
    }

    /// Add a sample to every window.
    ///
    /// Samples must arrive in timestamp order; equal timestamps are accepted.
    /// A rejected sample leaves every window unchanged.
    pub fn submit(&mut self, timestamp: Instant, rate_cpm: f64) -> Result<(), DecodeError> {
        if !rate_cpm.is_finite() || rate_cpm < 0.0 {
            return Err(DecodeError::InvalidRate(rate_cpm));
        }
        if let Some(latest) = self.latest
            && timestamp < latest
        {
            return Err(DecodeError::NonMonotonicSample {
                behind: latest - timestamp,
            });
        }

        let sample = WindowSample {
            timestamp,
            rate_cpm,
        };
        for window in &mut self.windows {
            window.push(sample);
        }
        self.latest = Some(timestamp);
        Ok(())
    }

    /// Timestamp of the latest accepted sample.
    pub fn latest(&self) -> Option<Instant> {
        self.latest
    }

    pub fn window(&self, duration: Duration) -> Option<&RollingWindow> {
        self.windows.iter().find(|w| w.duration == duration)
    }

    /// Statistics for every window, shortest first.
    pub fn snapshot(&self) -> Vec<WindowReport> {
        self.windows.iter().map(RollingWindow::report).collect()
    }
}
