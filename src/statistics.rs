//! Statistics value types and the recorder-level "all" metric.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sample::{Comparison, Sample};
use crate::window::WindowSpec;

/// `{current, best, worst, average}` for one metric.
///
/// Every field stays `None` until a qualifying value has been observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Statistics<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
}

impl<T> Default for Statistics<T> {
    fn default() -> Self {
        Self {
            current: None,
            best: None,
            worst: None,
            average: None,
        }
    }
}

impl<T> Statistics<T> {
    pub fn new(current: Option<T>, best: Option<T>, worst: Option<T>, average: Option<f64>) -> Self {
        Self {
            current,
            best,
            worst,
            average,
        }
    }
}

/// Running best/worst/current/average over every recorded sample.
///
/// DNF samples become `current` but are excluded from best, worst and the
/// average. The average is taken over absolute values.
#[derive(Debug, Clone, Default)]
pub struct AllTracker {
    stats: Statistics<Sample>,
    valid_count: u64,
}

impl AllTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from persisted statistics and the number of valid samples.
    pub fn restore(stats: Statistics<Sample>, valid_count: u64) -> Self {
        Self { stats, valid_count }
    }

    pub fn record(&mut self, sample: Sample) {
        if sample.is_valid() {
            let magnitude = sample.value().abs();
            let average = self.stats.average.unwrap_or(0.0);
            let count = self.valid_count as f64;
            self.stats.average = Some((average * count + magnitude) / (count + 1.0));
            self.valid_count += 1;

            let replaces_best = match &self.stats.best {
                Some(best) => sample.compare(best) == Some(Comparison::Better),
                None => true,
            };
            if replaces_best {
                self.stats.best = Some(sample);
            }

            let replaces_worst = match &self.stats.worst {
                Some(worst) => sample.compare(worst) == Some(Comparison::Worse),
                None => true,
            };
            if replaces_worst {
                self.stats.worst = Some(sample);
            }
        }

        self.stats.current = Some(sample);
    }

    pub fn statistics(&self) -> &Statistics<Sample> {
        &self.stats
    }

    pub fn valid_count(&self) -> u64 {
        self.valid_count
    }
}

/// Immutable view of every metric, published after each append.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StatisticsSnapshot {
    /// Samples recorded, DNF included
    pub total: u64,
    /// Samples recorded, DNF excluded
    pub valid: u64,
    pub all: Statistics<Sample>,
    pub windows: BTreeMap<WindowSpec, Statistics<f64>>,
}

impl StatisticsSnapshot {
    /// Look up a window by its key, e.g. `"ao5"`.
    pub fn window(&self, key: &str) -> Option<&Statistics<f64>> {
        let spec = key.parse::<WindowSpec>().ok()?;
        self.windows.get(&spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::DNF;

    fn sample(seq: u64, time: f64) -> Sample {
        Sample::number_response(seq, time).unwrap()
    }

    #[test]
    fn test_tracker_uses_magnitudes() {
        let mut tracker = AllTracker::new();
        tracker.record(sample(0, -0.25));
        tracker.record(sample(1, 0.5));
        tracker.record(sample(2, 0.125));

        let stats = tracker.statistics();
        assert_eq!(stats.best.map(|s| s.sequence()), Some(2));
        assert_eq!(stats.worst.map(|s| s.sequence()), Some(1));
        assert_eq!(stats.current.map(|s| s.sequence()), Some(2));
        assert_eq!(stats.average, Some(0.875 / 3.0));
        assert_eq!(tracker.valid_count(), 3);
    }

    #[test]
    fn test_tracker_dnf_only_moves_current() {
        let mut tracker = AllTracker::new();
        tracker.record(Sample::dnf(0));
        assert_eq!(tracker.statistics().best, None);
        assert_eq!(tracker.statistics().average, None);
        assert_eq!(tracker.statistics().current.map(|s| s.value()), Some(DNF));

        tracker.record(sample(1, 0.3));
        tracker.record(Sample::dnf(2));
        assert_eq!(tracker.statistics().best.map(|s| s.sequence()), Some(1));
        assert_eq!(tracker.statistics().average, Some(0.3));
        assert_eq!(tracker.valid_count(), 1);
    }

    #[test]
    fn test_tracker_tie_goes_to_later_best() {
        let mut tracker = AllTracker::new();
        tracker.record(sample(0, 0.2));
        tracker.record(sample(1, -0.2));

        // equal magnitude: the later sample is better, so it takes best and
        // leaves worst with the earlier one
        assert_eq!(tracker.statistics().best.map(|s| s.sequence()), Some(1));
        assert_eq!(tracker.statistics().worst.map(|s| s.sequence()), Some(0));
    }

    #[test]
    fn test_snapshot_window_lookup() {
        let mut snapshot = StatisticsSnapshot::default();
        snapshot.windows.insert(
            WindowSpec::trimmed(5).unwrap(),
            Statistics::new(Some(1.0), Some(1.0), Some(1.0), Some(1.0)),
        );
        assert!(snapshot.window("ao5").is_some());
        assert!(snapshot.window("ao12").is_none());
        assert!(snapshot.window("bogus").is_none());
    }
}
