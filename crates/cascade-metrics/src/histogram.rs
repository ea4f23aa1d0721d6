//! Wait-time histogram

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Upper bucket bounds, in microseconds
const DEFAULT_BOUNDS_US: [u64; 10] = [
    100, 500, 1_000, 5_000, 10_000, 50_000, 100_000, 500_000, 1_000_000, 5_000_000,
];

/// Histogram of durations with fixed microsecond buckets.
///
/// The last bucket also absorbs everything above the largest bound.
pub struct Histogram {
    bounds_us: Vec<u64>,
    counts: Vec<AtomicU64>,
    sum_us: AtomicU64,
    max_us: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Histogram with the default bounds
    pub fn new() -> Self {
        Self::with_bounds(DEFAULT_BOUNDS_US.to_vec())
    }

    /// Histogram with custom bounds. Bounds must be ascending.
    pub fn with_bounds(bounds_us: Vec<u64>) -> Self {
        let counts = bounds_us.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds_us,
            counts,
            sum_us: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record one duration
    pub fn observe(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.sum_us.fetch_add(us, Ordering::Relaxed);
        self.max_us.fetch_max(us, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let index = self
            .bounds_us
            .iter()
            .position(|bound| us <= *bound)
            .unwrap_or(self.bounds_us.len().saturating_sub(1));
        if let Some(bucket) = self.counts.get(index) {
            bucket.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Mean in microseconds, 0 when empty
    pub fn mean_us(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.sum_us.load(Ordering::Relaxed) as f64 / count as f64
    }

    /// Largest observation in microseconds
    pub fn max_us(&self) -> u64 {
        self.max_us.load(Ordering::Relaxed)
    }

    /// Number of observations
    pub fn total_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// (bound, count) pairs
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        self.bounds_us
            .iter()
            .zip(&self.counts)
            .map(|(bound, count)| (*bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}
