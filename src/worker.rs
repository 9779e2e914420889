//! Single-writer worker owning the [`Recorder`].
//!
//! All store mutations run on one dedicated thread with its own
//! current-thread Tokio runtime, fed by a bounded command queue. Callers get
//! a cheap, cloneable [`RecorderHandle`]; each request carries a oneshot
//! channel for its response, so requests are applied in the order they were
//! enqueued. Statistics are published as immutable snapshots after every
//! mutation and can be read from any thread without a round trip.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::recorder::Recorder;
use crate::sample::{Sample, DNF};
use crate::statistics::StatisticsSnapshot;
use crate::storage::{FileSystem, RecordStore};
use crate::window::WindowSpec;

/// Worker thread settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Requests that may wait in the queue before callers get `Backpressure`
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

fn default_queue_depth() -> usize {
    1024
}

fn default_thread_name() -> String {
    "onesec-recorder".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            thread_name: default_thread_name(),
        }
    }
}

/// Requests executed on the worker thread.
pub enum RecorderCommand {
    Create {
        root: PathBuf,
        group_size: u64,
        windows: Vec<WindowSpec>,
        response: oneshot::Sender<Result<()>>,
    },
    Load {
        root: PathBuf,
        response: oneshot::Sender<Result<()>>,
    },
    AutoOpen {
        root: PathBuf,
        group_size: u64,
        windows: Vec<WindowSpec>,
        response: oneshot::Sender<Result<bool>>,
    },
    Append {
        value: f64,
        response: oneshot::Sender<Result<u64>>,
    },
    Samples {
        response: oneshot::Sender<Result<Vec<Sample>>>,
    },
    Export {
        response: oneshot::Sender<Result<Value>>,
    },
    Sync {
        response: oneshot::Sender<Result<()>>,
    },
    Delete {
        response: oneshot::Sender<Result<bool>>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

type Published = Arc<RwLock<Arc<StatisticsSnapshot>>>;

/// State living on the worker thread.
struct RecorderWorker {
    fs: Arc<dyn FileSystem>,
    recorder: Option<Recorder>,
    published: Published,
}

impl RecorderWorker {
    fn open(&self) -> Result<&Recorder> {
        self.recorder.as_ref().ok_or(Error::NotOpen)
    }

    fn open_mut(&mut self) -> Result<&mut Recorder> {
        self.recorder.as_mut().ok_or(Error::NotOpen)
    }

    /// Flush state a failed append left unpersisted in the open store.
    fn sync_open(&mut self) {
        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.sync() {
                error!(
                    root = %recorder.store().root().display(),
                    "Open store still has unpersisted state: {}", e
                );
            }
        }
    }

    fn install(&mut self, recorder: Recorder) {
        if let Some(previous) = self.recorder.replace(recorder) {
            debug!(root = %previous.store().root().display(), "Closing previous store");
        }
    }

    fn publish(&self) {
        let snapshot = self
            .recorder
            .as_ref()
            .map(Recorder::statistics)
            .unwrap_or_default();
        *self.published.write() = Arc::new(snapshot);
    }

    /// Handle one command. Returns false once the worker should stop.
    fn handle(&mut self, command: RecorderCommand) -> bool {
        match command {
            RecorderCommand::Create {
                root,
                group_size,
                windows,
                response,
            } => {
                self.sync_open();
                let result = Recorder::create(self.fs.clone(), &root, group_size, &windows)
                    .map(|recorder| self.install(recorder));
                self.publish();
                let _ = response.send(result);
            }
            RecorderCommand::Load { root, response } => {
                self.sync_open();
                let result = Recorder::load(self.fs.clone(), &root).map(|recorder| self.install(recorder));
                self.publish();
                let _ = response.send(result);
            }
            RecorderCommand::AutoOpen {
                root,
                group_size,
                windows,
                response,
            } => {
                self.sync_open();
                let result = Recorder::auto_open(self.fs.clone(), &root, group_size, &windows).map(
                    |(recorder, created)| {
                        self.install(recorder);
                        created
                    },
                );
                self.publish();
                let _ = response.send(result);
            }
            RecorderCommand::Append { value, response } => {
                let result = self.open_mut().and_then(|recorder| recorder.append(value));
                self.publish();
                let _ = response.send(result);
            }
            RecorderCommand::Samples { response } => {
                let _ = response.send(self.open().and_then(Recorder::samples));
            }
            RecorderCommand::Export { response } => {
                let _ = response.send(self.open().and_then(Recorder::export));
            }
            RecorderCommand::Sync { response } => {
                let _ = response.send(self.open_mut().and_then(Recorder::sync));
            }
            RecorderCommand::Delete { response } => {
                // the store stays open unless its directory is really gone
                let result = self
                    .open()
                    .and_then(|recorder| RecordStore::destroy(self.fs.as_ref(), recorder.store().root()));
                if result.is_ok() {
                    self.recorder = None;
                }
                self.publish();
                let _ = response.send(result);
            }
            RecorderCommand::Shutdown { response } => {
                self.shutdown();
                let _ = response.send(());
                return false;
            }
        }
        true
    }

    fn shutdown(&mut self) {
        self.sync_open();
        self.recorder = None;
    }
}

/// Cloneable handle to the recorder worker.
#[derive(Clone)]
pub struct RecorderHandle {
    sender: mpsc::Sender<RecorderCommand>,
    published: Published,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
    queue_depth: usize,
}

impl RecorderHandle {
    /// Start the worker thread. No store is open until `create`, `load` or
    /// `auto_open` succeeds.
    pub fn spawn(fs: Arc<dyn FileSystem>, config: WorkerConfig) -> Result<Self> {
        if config.queue_depth == 0 {
            return Err(Error::config("worker.queue_depth must be positive"));
        }

        let (sender, mut receiver) = mpsc::channel::<RecorderCommand>(config.queue_depth);
        let published: Published = Arc::new(RwLock::new(Arc::new(StatisticsSnapshot::default())));

        // Single-threaded runtime dedicated to the worker thread
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

        let mut worker = RecorderWorker {
            fs,
            recorder: None,
            published: published.clone(),
        };

        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some(command) = receiver.recv().await {
                        if !worker.handle(command) {
                            break;
                        }
                    }
                    worker.shutdown();
                });
                debug!("Recorder worker exited");
            })?;

        info!(thread = %config.thread_name, queue_depth = config.queue_depth, "Started recorder worker");
        Ok(Self {
            sender,
            published,
            thread: Arc::new(Mutex::new(Some(thread))),
            queue_depth: config.queue_depth,
        })
    }

    /// Spawn a worker and create a new store in `root`.
    pub async fn create_store(
        fs: Arc<dyn FileSystem>,
        config: WorkerConfig,
        root: impl Into<PathBuf>,
        group_size: u64,
        windows: &[WindowSpec],
    ) -> Result<Self> {
        let handle = Self::spawn(fs, config)?;
        handle.create(root, group_size, windows).await?;
        Ok(handle)
    }

    /// Spawn a worker and load the store in `root`.
    pub async fn load_store(
        fs: Arc<dyn FileSystem>,
        config: WorkerConfig,
        root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let handle = Self::spawn(fs, config)?;
        handle.load(root).await?;
        Ok(handle)
    }

    /// Spawn a worker and open or create the store in `root`.
    pub async fn auto_open_store(
        fs: Arc<dyn FileSystem>,
        config: WorkerConfig,
        root: impl Into<PathBuf>,
        group_size: u64,
        windows: &[WindowSpec],
    ) -> Result<(Self, bool)> {
        let handle = Self::spawn(fs, config)?;
        let created = handle.auto_open(root, group_size, windows).await?;
        Ok((handle, created))
    }

    fn submit(&self, command: RecorderCommand) -> Result<()> {
        self.sender.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::Backpressure {
                depth: self.queue_depth,
            },
            mpsc::error::TrySendError::Closed(_) => Error::WorkerStopped,
        })
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> RecorderCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.submit(command(tx))?;
        rx.await.map_err(|_| Error::WorkerStopped)?
    }

    pub async fn create(&self, root: impl Into<PathBuf>, group_size: u64, windows: &[WindowSpec]) -> Result<()> {
        let root = root.into();
        let windows = windows.to_vec();
        self.request(|response| RecorderCommand::Create {
            root,
            group_size,
            windows,
            response,
        })
        .await
    }

    pub async fn load(&self, root: impl Into<PathBuf>) -> Result<()> {
        let root = root.into();
        self.request(|response| RecorderCommand::Load { root, response }).await
    }

    /// Returns true when a new store was created.
    pub async fn auto_open(&self, root: impl Into<PathBuf>, group_size: u64, windows: &[WindowSpec]) -> Result<bool> {
        let root = root.into();
        let windows = windows.to_vec();
        self.request(|response| RecorderCommand::AutoOpen {
            root,
            group_size,
            windows,
            response,
        })
        .await
    }

    /// Record a measurement; resolves to its sequence number.
    pub async fn append(&self, value: f64) -> Result<u64> {
        self.request(|response| RecorderCommand::Append { value, response }).await
    }

    pub async fn append_dnf(&self) -> Result<u64> {
        self.append(DNF).await
    }

    pub async fn samples(&self) -> Result<Vec<Sample>> {
        self.request(|response| RecorderCommand::Samples { response }).await
    }

    pub async fn export(&self) -> Result<Value> {
        self.request(|response| RecorderCommand::Export { response }).await
    }

    pub async fn sync(&self) -> Result<()> {
        self.request(|response| RecorderCommand::Sync { response }).await
    }

    /// Delete the open store; the worker keeps running without one.
    pub async fn delete(&self) -> Result<bool> {
        self.request(|response| RecorderCommand::Delete { response }).await
    }

    /// Latest published statistics. Never waits for the worker.
    pub fn statistics(&self) -> Arc<StatisticsSnapshot> {
        self.published.read().clone()
    }

    /// Process everything already queued, then stop the worker and join it.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RecorderCommand::Shutdown { response: tx })
            .await
            .map_err(|_| Error::WorkerStopped)?;
        rx.await.map_err(|_| Error::WorkerStopped)?;

        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                error!("Recorder worker panicked");
            }
        }
        info!("Recorder worker stopped");
        Ok(())
    }
}
