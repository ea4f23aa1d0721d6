//! Snapshot export

use crate::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time copy of a [`Metrics`] store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Counter values
    pub counters: BTreeMap<String, u64>,
    /// Gauge values
    pub gauges: BTreeMap<String, i64>,
    /// Histogram summaries
    pub histograms: BTreeMap<String, HistogramSummary>,
}

/// Summary of a histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    /// Mean, microseconds
    pub mean_us: f64,
    /// Max, microseconds
    pub max_us: u64,
    /// Observation count
    pub count: u64,
}

impl MetricsSnapshot {
    /// Snapshot a store
    pub fn from_metrics(metrics: &Metrics) -> Self {
        let histograms = metrics
            .all_histograms()
            .into_iter()
            .map(|(name, h)| {
                let summary = HistogramSummary {
                    mean_us: h.mean_us(),
                    max_us: h.max_us(),
                    count: h.total_count(),
                };
                (name, summary)
            })
            .collect();

        Self {
            counters: metrics.all_counters().into_iter().collect(),
            gauges: metrics.all_gauges().into_iter().collect(),
            histograms,
        }
    }

    /// Counter from the snapshot, 0 if absent
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_snapshot_json() {
        let metrics = Metrics::new();
        metrics.add("barrier.drained.consensus", 3);
        metrics.set_gauge("consensus.height", 2);
        metrics.observe("barrier.consensus_wait", Duration::from_micros(40));

        let snapshot = MetricsSnapshot::from_metrics(&metrics);
        assert_eq!(snapshot.counter("barrier.drained.consensus"), 3);
        assert_eq!(snapshot.counter("missing"), 0);

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("barrier.drained.consensus"));
        assert!(json.contains("consensus.height"));
        assert!(json.contains("barrier.consensus_wait"));
    }
}
