//! Error types for the recording engine.

use std::path::PathBuf;
use thiserror::Error;

use crate::sample::DataKind;

/// A specialized Result type for recorder operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for recorder and record store operations.
#[derive(Error, Debug)]
pub enum Error {
    /// `create` was called on a directory that already holds files
    #[error("Store already exists: {} is not empty", .0.display())]
    StoreAlreadyExists(PathBuf),

    /// Manifest or shard missing, corrupt, or of an incompatible version/kind
    #[error("Store format error: {0}")]
    StoreFormat(String),

    /// Underlying filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A sample of one kind was offered to a store of another
    #[error("Data type mismatch: expected {expected}, got {actual}")]
    DataTypeMismatch { expected: DataKind, actual: DataKind },

    /// The worker queue is full
    #[error("Recorder queue is full ({depth} pending requests)")]
    Backpressure { depth: usize },

    /// Invalid configuration (window sizes, group size, settings files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Encoding failure while writing JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The measurement cannot be recorded (NaN or negative infinity)
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    /// The sample was applied in memory but did not reach disk
    #[error("Sample {sequence} is recorded in memory but not persisted: {source}")]
    NotDurable {
        sequence: u64,
        #[source]
        source: Box<Error>,
    },

    /// The recorder worker has shut down
    #[error("Recorder worker is not running")]
    WorkerStopped,

    /// The worker has no store open
    #[error("No store is open")]
    NotOpen,
}

impl Error {
    /// Create a store format error
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Error::StoreFormat(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Whether the in-memory state moved ahead of the disk state.
    pub fn is_not_durable(&self) -> bool {
        matches!(self, Error::NotDurable { .. })
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
