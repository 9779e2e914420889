//! Configuration management for the recorder.
//!
//! Settings are read from, in increasing precedence:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/onesec/config.toml`)
//! 3. User-specified configuration file
//! 4. Environment variables (prefixed with `ONESEC_`, sections separated by `__`)
//! 5. Command-line arguments
//!
//! # Environment Variables
//!
//! - `ONESEC_STORE__DIRECTORY` - Store directory
//! - `ONESEC_STORE__GROUP_SIZE` - Samples per shard file
//! - `ONESEC_WORKER__QUEUE_DEPTH` - Pending requests before backpressure

use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::window::WindowSpec;
use crate::worker::WorkerConfig;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Command-line overrides shared by every subcommand
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store directory
    #[arg(short = 'd', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Samples per shard file (new stores only)
    #[arg(long, global = true)]
    pub group_size: Option<u64>,

    /// Windows to track, e.g. `mo3,ao5` (new stores only)
    #[arg(long = "window", global = true, value_delimiter = ',')]
    pub windows: Vec<String>,

    /// Maximum pending requests on the recorder worker
    #[arg(long, global = true)]
    pub queue_depth: Option<usize>,
}

/// Recorder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub store: StoreSettings,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Record store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Directory holding the manifest and shard files
    pub directory: PathBuf,
    /// Samples per shard file
    #[serde(default = "default_group_size")]
    pub group_size: u64,
    /// Windows tracked by newly created stores
    #[serde(default = "WindowSpec::defaults")]
    pub windows: Vec<WindowSpec>,
}

impl Settings {
    /// Load settings from all sources
    pub fn load(args: &ConfigArgs) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::with_name("/etc/onesec/config.toml").required(false));

        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ONESEC")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.apply(args)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply command-line overrides
    fn apply(&mut self, args: &ConfigArgs) -> Result<()> {
        if let Some(directory) = &args.directory {
            self.store.directory = directory.clone();
        }
        if let Some(group_size) = args.group_size {
            self.store.group_size = group_size;
        }
        if !args.windows.is_empty() {
            self.store.windows = args
                .windows
                .iter()
                .map(|w| w.parse())
                .collect::<Result<Vec<WindowSpec>>>()?;
        }
        if let Some(depth) = args.queue_depth {
            self.worker.queue_depth = depth;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.group_size == 0 {
            return Err(Error::config("store.group_size must be positive"));
        }
        if self.worker.queue_depth == 0 {
            return Err(Error::config("worker.queue_depth must be positive"));
        }
        Ok(())
    }
}

fn default_group_size() -> u64 {
    100
}
