//! Streaming reaction-time statistics with a sharded, resumable record store.
//!
//! Measurements are appended through a [`Recorder`], which maintains
//! mean-of-N and trimmed average-of-N windows plus overall best/worst/average,
//! and persists every sample with the aggregate state into a [`RecordStore`].
//! [`RecorderHandle`] runs the recorder on a dedicated worker thread so all
//! writes are serialized.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod recorder;
pub mod sample;
pub mod statistics;
pub mod storage;
pub mod window;
pub mod worker;

// Re-export commonly used types
pub use analysis::{Analysis, WindowSeries};
pub use error::{Error, Result};
pub use recorder::Recorder;
pub use sample::{Comparison, DataKind, NumberResponse, Sample, DNF};
pub use statistics::{AllTracker, Statistics, StatisticsSnapshot};
pub use storage::{FileSystem, LocalFileSystem, MemoryFileSystem, RecordStore};
pub use window::{WindowAggregator, WindowKind, WindowSpec};
pub use worker::{RecorderHandle, WorkerConfig};
