//! # cascade-metrics
//!
//! In-process metrics for one node composition.
//!
//! Features:
//! - Counters for drained signals and processed events
//! - Gauges for per-subsystem state (heights, pool sizes)
//! - Wait-time histograms for barrier calls
//! - JSON snapshot export
//!
//! Every composition owns its own [`Metrics`]; nothing here is global.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod collector;
mod export;
mod histogram;

pub use collector::Metrics;
pub use export::{HistogramSummary, MetricsSnapshot};
pub use histogram::Histogram;

/// Time an expression (sync or `.await`ing) into a histogram, in microseconds
#[macro_export]
macro_rules! timed {
    ($metrics:expr, $name:expr, $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        $metrics.observe($name, start.elapsed());
        result
    }};
}
