//! Offline analysis of a recorded sample sequence.
//!
//! Unlike the [`Recorder`](crate::recorder::Recorder), which keeps only the
//! newest windowed result, an analysis keeps the whole series of results for
//! every window so it can be plotted or exported.

use serde::Serialize;

use crate::sample::Sample;
use crate::statistics::{AllTracker, Statistics};
use crate::window::{WindowAggregator, WindowSpec};

/// Every result one window produced over the analysed samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSeries {
    pub window: WindowSpec,
    /// One entry per sample; `None` until the window first fills
    pub results: Vec<Option<f64>>,
    pub statistics: Statistics<f64>,
}

/// Batch statistics over a sample sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub total: u64,
    pub valid: u64,
    /// Best, worst and mean magnitude of the valid samples
    pub all: Statistics<Sample>,
    pub windows: Vec<WindowSeries>,
}

impl Analysis {
    /// Replay `samples` in order through fresh aggregators for `windows`.
    pub fn from_samples(samples: &[Sample], windows: &[WindowSpec]) -> Self {
        let mut all = AllTracker::new();
        let mut aggregators: Vec<WindowAggregator> = windows.iter().copied().map(WindowAggregator::new).collect();
        let mut series: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(samples.len()); windows.len()];

        for sample in samples {
            all.record(*sample);
            for (aggregator, results) in aggregators.iter_mut().zip(series.iter_mut()) {
                results.push(aggregator.add(sample.value()));
            }
        }

        let windows = aggregators
            .into_iter()
            .zip(series)
            .map(|(aggregator, results)| {
                let current = results.last().copied().flatten();
                WindowSeries {
                    window: aggregator.spec(),
                    statistics: Statistics::new(
                        current,
                        aggregator.best(),
                        aggregator.worst(),
                        aggregator.average(),
                    ),
                    results,
                }
            })
            .collect();

        Self {
            total: samples.len() as u64,
            valid: all.valid_count(),
            all: all.statistics().clone(),
            windows,
        }
    }

    pub fn window(&self, key: &str) -> Option<&WindowSeries> {
        let spec = key.parse::<WindowSpec>().ok()?;
        self.windows.iter().find(|series| series.window == spec)
    }
}
