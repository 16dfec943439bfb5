use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

// ── Ring buffer ──────────────────────────────────────────────────────

/// A fixed-size ring buffer backed by `VecDeque`.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an item, evicting the oldest if at capacity.
    pub fn push(&mut self, item: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate over items from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }
}

// ── Performance summary ──────────────────────────────────────────────

/// Rolling render throughput, in completed traces per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceSummary {
    /// Number of samples in the rolling window.
    pub samples: usize,
    /// Throughput measured over the most recent tonemap interval.
    pub latest: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// Wall-clock time the latest sample was taken, for reporting only.
    pub recorded_at: DateTime<Utc>,
}

impl PerformanceSummary {
    /// Population mean and standard deviation of a sample window.
    pub fn from_samples(
        samples: &RingBuffer<f64>,
        latest: f64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let n = samples.len().max(1) as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let sqr_mean = samples.iter().map(|s| s * s).sum::<f64>() / n;
        // Rounding can push this slightly below zero for near-constant samples.
        let variance = (sqr_mean - mean * mean).max(0.0);

        Self {
            samples: samples.len(),
            latest,
            mean,
            std_dev: variance.sqrt(),
            recorded_at,
        }
    }
}

// ── Throughput tracker ───────────────────────────────────────────────

/// Counts completed traces between tonemaps and keeps a bounded history
/// of the resulting throughput samples.
///
/// Windows are measured on the monotonic clock; wall-clock steps never
/// shorten or stretch a window.
#[derive(Debug, Clone)]
pub struct ThroughputTracker {
    completed_traces: u64,
    last_tonemap: Instant,
    history: RingBuffer<f64>,
    latest: Option<PerformanceSummary>,
}

impl ThroughputTracker {
    pub fn new(capacity: usize, now: Instant) -> Self {
        Self {
            completed_traces: 0,
            last_tonemap: now,
            history: RingBuffer::new(capacity),
            latest: None,
        }
    }

    pub fn record_trace(&mut self) {
        self.completed_traces += 1;
    }

    /// Time spent in the current measurement window as of `now`.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_tonemap)
    }

    /// Close the current measurement window at `now`.
    pub fn record_tonemap(&mut self, now: Instant) -> PerformanceSummary {
        let elapsed_ms = self.elapsed(now).as_millis().max(1);
        let traces_per_sec = self.completed_traces as f64 * 1000.0 / elapsed_ms as f64;

        self.last_tonemap = now;
        self.completed_traces = 0;
        self.history.push(traces_per_sec);

        let summary = PerformanceSummary::from_samples(&self.history, traces_per_sec, Utc::now());
        self.latest = Some(summary);
        summary
    }

    pub fn completed_traces(&self) -> u64 {
        self.completed_traces
    }

    pub fn last_tonemap(&self) -> Instant {
        self.last_tonemap
    }

    pub fn history(&self) -> &RingBuffer<f64> {
        &self.history
    }

    /// Summary produced by the most recent tonemap, if any.
    pub fn latest(&self) -> Option<PerformanceSummary> {
        self.latest
    }
}
