//! Sliding-window aggregation over a stream of times.
//!
//! Two window kinds are supported:
//! - `MO(N)`: mean of the last N values
//! - `AO(N)`: average of the last N values excluding one minimum and one maximum
//!
//! Each insertion costs O(log N): the window keeps a running sum, a DNF
//! counter and, for `AO`, an ordered multiset of the values it holds. Besides
//! the newest windowed result, an aggregator tracks the best, worst and
//! running average of every result it has produced.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::sample::{is_dnf, DNF};

/// How a full window is reduced to one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WindowKind {
    /// Mean of N
    Mean,
    /// Average of N without the single best and single worst entry
    TrimmedAverage,
}

impl WindowKind {
    fn prefix(self) -> &'static str {
        match self {
            WindowKind::Mean => "mo",
            WindowKind::TrimmedAverage => "ao",
        }
    }
}

/// A validated window configuration such as `mo3` or `ao12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WindowSpec {
    kind: WindowKind,
    size: usize,
}

impl WindowSpec {
    pub fn new(kind: WindowKind, size: usize) -> Result<Self> {
        match kind {
            WindowKind::Mean if size == 0 => {
                Err(Error::config("mean window size must be at least 1"))
            }
            WindowKind::TrimmedAverage if size <= 2 => Err(Error::config(format!(
                "trimmed average window size must be at least 3, got {}",
                size
            ))),
            _ => Ok(Self { kind, size }),
        }
    }

    pub fn mean(size: usize) -> Result<Self> {
        Self::new(WindowKind::Mean, size)
    }

    pub fn trimmed(size: usize) -> Result<Self> {
        Self::new(WindowKind::TrimmedAverage, size)
    }

    /// `mo3`, `ao5`, `ao12`, `ao100`
    pub fn defaults() -> Vec<WindowSpec> {
        vec![
            WindowSpec { kind: WindowKind::Mean, size: 3 },
            WindowSpec { kind: WindowKind::TrimmedAverage, size: 5 },
            WindowSpec { kind: WindowKind::TrimmedAverage, size: 12 },
            WindowSpec { kind: WindowKind::TrimmedAverage, size: 100 },
        ]
    }

    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Key under which this window is stored in the manifest.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.size)
    }
}

impl FromStr for WindowSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let (kind, digits) = if let Some(rest) = lower.strip_prefix("mo") {
            (WindowKind::Mean, rest)
        } else if let Some(rest) = lower.strip_prefix("ao") {
            (WindowKind::TrimmedAverage, rest)
        } else {
            return Err(Error::config(format!("unknown window '{}', expected mo<N> or ao<N>", s)));
        };

        let size = digits
            .parse::<usize>()
            .map_err(|_| Error::config(format!("invalid window size in '{}'", s)))?;
        WindowSpec::new(kind, size)
    }
}

impl TryFrom<String> for WindowSpec {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<WindowSpec> for String {
    fn from(spec: WindowSpec) -> Self {
        spec.to_string()
    }
}

/// Online aggregator for one window.
#[derive(Debug, Clone)]
pub struct WindowAggregator {
    spec: WindowSpec,
    /// FIFO of the last `min(N, inserted)` values, oldest first
    window: VecDeque<f64>,
    /// Multiset of the window's values; only maintained for trimmed averages
    ordered: BTreeMap<OrderedFloat<f64>, usize>,
    /// Sum of the finite values in the window
    sum: f64,
    dnf_count: usize,
    inserted: u64,
    best: Option<f64>,
    worst: Option<f64>,
    average: Option<f64>,
    effective_count: u64,
}

impl WindowAggregator {
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            window: VecDeque::with_capacity(spec.size),
            ordered: BTreeMap::new(),
            sum: 0.0,
            dnf_count: 0,
            inserted: 0,
            best: None,
            worst: None,
            average: None,
            effective_count: 0,
        }
    }

    pub fn spec(&self) -> WindowSpec {
        self.spec
    }

    /// Insert a value and return the newest windowed result.
    ///
    /// Returns `None` until N values have been seen. The result may be
    /// [`DNF`]; DNF results never affect best, worst or average.
    pub fn add(&mut self, value: f64) -> Option<f64> {
        if self.window.len() == self.spec.size {
            if let Some(evicted) = self.window.pop_front() {
                self.forget(evicted);
            }
        }

        self.window.push_back(value);
        self.remember(value);
        self.inserted += 1;

        if self.window.len() < self.spec.size {
            return None;
        }

        let result = self.compute();
        self.track(result);
        Some(result)
    }

    /// Best (smallest) result ever produced.
    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Worst (largest) result ever produced.
    pub fn worst(&self) -> Option<f64> {
        self.worst
    }

    /// Mean of every non-DNF result produced.
    pub fn average(&self) -> Option<f64> {
        self.average
    }

    /// Number of results folded into [`average`](Self::average).
    pub fn effective_count(&self) -> u64 {
        self.effective_count
    }

    /// Total values inserted over the aggregator's lifetime.
    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Running sum of the finite values in the window.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Values currently held, oldest first.
    pub fn window(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }

    /// Restore the lifetime best/worst/average from a persisted snapshot.
    pub fn restore_tracking(
        &mut self,
        best: Option<f64>,
        worst: Option<f64>,
        average: Option<f64>,
        effective_count: u64,
    ) {
        self.best = best;
        self.worst = worst;
        self.average = average;
        self.effective_count = effective_count;
    }

    /// Rebuild the window contents after a restart.
    ///
    /// `tail` holds the most recent values in insertion order and `inserted`
    /// the lifetime insertion count. `sum` is the running sum persisted with
    /// the window; restoring it keeps later results bit-identical to an
    /// aggregator that never stopped, since re-adding the tail rounds
    /// differently. Without it the sum is rebuilt from the tail. Only the
    /// window state is rebuilt; no result is produced and the tracked
    /// statistics are left untouched.
    pub fn refill(&mut self, tail: &[f64], inserted: u64, sum: Option<f64>) -> Result<()> {
        let needed = (self.spec.size as u64).min(inserted) as usize;
        if tail.len() < needed {
            return Err(Error::format(format!(
                "{} needs the last {} values to resume, only {} available",
                self.spec,
                needed,
                tail.len()
            )));
        }

        self.window.clear();
        self.ordered.clear();
        self.sum = 0.0;
        self.dnf_count = 0;

        for &value in &tail[tail.len() - needed..] {
            self.window.push_back(value);
            self.remember(value);
        }
        if let Some(sum) = sum {
            self.sum = sum;
        }
        self.inserted = inserted;
        Ok(())
    }

    fn remember(&mut self, value: f64) {
        if is_dnf(value) {
            self.dnf_count += 1;
        } else {
            self.sum += value;
        }

        if self.spec.kind == WindowKind::TrimmedAverage {
            *self.ordered.entry(OrderedFloat(value)).or_insert(0) += 1;
        }
    }

    fn forget(&mut self, value: f64) {
        if is_dnf(value) {
            self.dnf_count -= 1;
        } else {
            self.sum -= value;
        }

        if self.spec.kind == WindowKind::TrimmedAverage {
            let key = OrderedFloat(value);
            if let Some(count) = self.ordered.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    self.ordered.remove(&key);
                }
            }
        }
    }

    fn compute(&self) -> f64 {
        let size = self.spec.size as f64;
        match self.spec.kind {
            WindowKind::Mean => {
                if self.dnf_count == 0 {
                    self.sum / size
                } else {
                    DNF
                }
            }
            WindowKind::TrimmedAverage => {
                let real_size = size - 2.0;
                let min = self.ordered.keys().next().map(|k| k.0);
                let max = self.ordered.keys().next_back().map(|k| k.0);
                match (self.dnf_count, min, max) {
                    (0, Some(min), Some(max)) => (self.sum - min - max) / real_size,
                    // the single DNF is the excluded maximum
                    (1, Some(min), _) => (self.sum - min) / real_size,
                    _ => DNF,
                }
            }
        }
    }

    fn track(&mut self, result: f64) {
        if is_dnf(result) {
            return;
        }

        if self.best.map_or(true, |best| result < best) {
            self.best = Some(result);
        }
        if self.worst.map_or(true, |worst| result > worst) {
            self.worst = Some(result);
        }

        let average = self.average.unwrap_or(0.0);
        let count = self.effective_count as f64;
        self.average = Some((average * count + result) / (count + 1.0));
        self.effective_count += 1;
    }
}
