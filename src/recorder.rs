//! The recorder binds window aggregators and the "all" tracker to a store.
//!
//! Every append updates the in-memory statistics and hands the sample plus
//! the resulting aggregate snapshot to the [`RecordStore`]. On load, the
//! lifetime statistics come from the manifest and only the window contents
//! are rebuilt from the tail of the stored samples.

use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::sample::{DataKind, Sample, DNF};
use crate::statistics::{AllTracker, Statistics, StatisticsSnapshot};
use crate::storage::{AggregateSnapshot, FileSystem, RecordStore, WindowSnapshot};
use crate::window::{WindowAggregator, WindowSpec};

/// One configured window and its newest result.
#[derive(Debug, Clone)]
struct TrackedWindow {
    aggregator: WindowAggregator,
    current: Option<f64>,
}

/// Synchronous recording engine for number responses.
///
/// Not thread-safe on its own; [`crate::worker::RecorderHandle`] gives it a
/// single owner thread.
#[derive(Debug)]
pub struct Recorder {
    store: RecordStore,
    windows: Vec<TrackedWindow>,
    all: AllTracker,
}

impl Recorder {
    pub const KIND: DataKind = DataKind::NumberResponse;

    /// Create a new store in `root` tracking `windows`.
    pub fn create(
        fs: Arc<dyn FileSystem>,
        root: impl AsRef<Path>,
        group_size: u64,
        windows: &[WindowSpec],
    ) -> Result<Self> {
        check_distinct(windows)?;
        let store = RecordStore::create(fs, root, group_size, Self::KIND, windows)?;
        Ok(Self::fresh(store))
    }

    /// Resume the store in `root` with the windows recorded in its manifest.
    pub fn load(fs: Arc<dyn FileSystem>, root: impl AsRef<Path>) -> Result<Self> {
        let store = RecordStore::load(fs, root, Self::KIND)?;
        Self::resume(store)
    }

    /// Load `root` if it holds a store, otherwise create one.
    ///
    /// Returns the recorder and whether a store was created.
    pub fn auto_open(
        fs: Arc<dyn FileSystem>,
        root: impl AsRef<Path>,
        group_size: u64,
        windows: &[WindowSpec],
    ) -> Result<(Self, bool)> {
        check_distinct(windows)?;
        let (store, created) = RecordStore::auto_open(fs, root, group_size, Self::KIND, windows)?;
        let recorder = if created { Self::fresh(store) } else { Self::resume(store)? };
        Ok((recorder, created))
    }

    fn fresh(store: RecordStore) -> Self {
        let windows = store
            .manifest()
            .window_specs()
            .into_iter()
            .map(|spec| TrackedWindow {
                aggregator: WindowAggregator::new(spec),
                current: None,
            })
            .collect();

        Self {
            store,
            windows,
            all: AllTracker::new(),
        }
    }

    fn resume(store: RecordStore) -> Result<Self> {
        let manifest = store.manifest();
        let depth = manifest
            .windows
            .keys()
            .map(WindowSpec::size)
            .max()
            .unwrap_or(0);
        let tail: Vec<f64> = store.tail(depth)?.iter().map(Sample::value).collect();

        let mut windows = Vec::with_capacity(manifest.windows.len());
        for (spec, snapshot) in &manifest.windows {
            let mut aggregator = WindowAggregator::new(*spec);
            aggregator.refill(&tail, manifest.data_size, snapshot.sum)?;
            aggregator.restore_tracking(snapshot.best, snapshot.worst, snapshot.average, snapshot.count);
            windows.push(TrackedWindow {
                aggregator,
                current: snapshot.current,
            });
        }

        let all = AllTracker::restore(manifest.all.clone(), manifest.valid_size);
        debug!(replayed = tail.len(), windows = windows.len(), "Reseeded window aggregators");

        Ok(Self { store, windows, all })
    }

    /// Record a measurement and return its sequence number.
    pub fn append(&mut self, value: f64) -> Result<u64> {
        let sample = Sample::number_response(self.store.next_sequence(), value)?;
        self.record(sample)
    }

    /// Record a DNF and return its sequence number.
    pub fn append_dnf(&mut self) -> Result<u64> {
        self.append(DNF)
    }

    fn record(&mut self, sample: Sample) -> Result<u64> {
        // refuse before touching the aggregates while the store cannot write
        self.store.check_next(&sample)?;
        self.store.sync()?;

        let value = sample.value();
        for window in &mut self.windows {
            if let Some(result) = window.aggregator.add(value) {
                window.current = Some(result);
            }
        }
        self.all.record(sample);

        self.store.append(sample, self.aggregate_snapshot())?;
        Ok(sample.sequence())
    }

    fn aggregate_snapshot(&self) -> AggregateSnapshot {
        AggregateSnapshot {
            all: self.all.statistics().clone(),
            windows: self
                .windows
                .iter()
                .map(|w| (w.aggregator.spec(), WindowSnapshot::capture(w.current, &w.aggregator)))
                .collect(),
        }
    }

    /// Current statistics of every metric.
    pub fn statistics(&self) -> StatisticsSnapshot {
        let manifest = self.store.manifest();
        StatisticsSnapshot {
            total: manifest.data_size,
            valid: manifest.valid_size,
            all: self.all.statistics().clone(),
            windows: self
                .windows
                .iter()
                .map(|w| {
                    let a = &w.aggregator;
                    (a.spec(), Statistics::new(w.current, a.best(), a.worst(), a.average()))
                })
                .collect(),
        }
    }

    pub fn window_specs(&self) -> Vec<WindowSpec> {
        self.windows.iter().map(|w| w.aggregator.spec()).collect()
    }

    pub fn samples(&self) -> Result<Vec<Sample>> {
        self.store.samples()
    }

    pub fn export(&self) -> Result<Value> {
        self.store.export()
    }

    /// Retry persisting state left behind by a failed append.
    pub fn sync(&mut self) -> Result<()> {
        self.store.sync()
    }

    pub fn is_durable(&self) -> bool {
        self.store.is_durable()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Remove the store from disk.
    pub fn delete(self) -> Result<bool> {
        info!(root = %self.store.root().display(), "Deleting recorder store");
        self.store.delete()
    }
}

fn check_distinct(windows: &[WindowSpec]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for spec in windows {
        if !seen.insert(*spec) {
            return Err(Error::config(format!("window {} configured twice", spec)));
        }
    }
    Ok(())
}
