//! Durable, sharded record store.
//!
//! A store directory holds `manifest.json` plus one `data<i>.json` per shard.
//! The manifest is the source of truth for counts: it is written last, so a
//! crash between a shard write and the manifest write leaves extra records in
//! the open shard, which `load` discards.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::fs::FileSystem;
use super::manifest::{AggregateSnapshot, Manifest, MANIFEST_FILE_NAME};
use super::shard::{parse_shard_file_name, shard_file_name, shard_index, ShardFile};
use crate::error::{Error, Result};
use crate::sample::{DataKind, Sample};
use crate::window::WindowSpec;

/// Suffix of the scratch file written before an atomic rename.
pub const TMP_SUFFIX: &str = ".tmp";

/// File-backed log of every sample plus the manifest.
#[derive(Debug)]
pub struct RecordStore {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    manifest: Manifest,
    /// Index of the shard receiving the next sample
    open_index: u64,
    /// Records of the open shard, mirrored in memory
    open_records: Vec<Sample>,
    /// False while the last append has not fully reached disk
    durable: bool,
}

impl RecordStore {
    /// Create an empty store in `root`, which must be missing or empty.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn create(
        fs: Arc<dyn FileSystem>,
        root: impl AsRef<Path>,
        group_size: u64,
        kind: DataKind,
        windows: &[WindowSpec],
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if group_size == 0 {
            return Err(Error::config("group_size must be positive"));
        }
        if fs.exists(&root) && !fs.list(&root)?.is_empty() {
            return Err(Error::StoreAlreadyExists(root));
        }

        fs.create_dir_all(&root)?;
        let mut store = Self {
            fs,
            root,
            manifest: Manifest::new(kind, group_size, windows),
            open_index: 0,
            open_records: Vec::new(),
            durable: false,
        };
        store.persist()?;

        info!(group_size, windows = windows.len(), "Created record store");
        Ok(store)
    }

    /// Open an existing store, repairing a torn open shard if needed.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn load(fs: Arc<dyn FileSystem>, root: impl AsRef<Path>, kind: DataKind) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let manifest_path = root.join(MANIFEST_FILE_NAME);
        if !fs.exists(&manifest_path) {
            return Err(Error::format(format!("no manifest in {}", root.display())));
        }
        let manifest = Manifest::parse(&fs.read_to_string(&manifest_path)?, kind)?;

        let group_size = manifest.group_size;
        let open_index = shard_index(manifest.data_size, group_size);
        let expected_open = (manifest.data_size % group_size) as usize;

        let present = fs.list_files(&root, &|name| parse_shard_file_name(name).is_some())?;
        let present: Vec<u64> = present
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).and_then(parse_shard_file_name))
            .collect();
        if let Some(missing) = (0..open_index).find(|i| !present.contains(i)) {
            return Err(Error::format(format!("missing shard {}", shard_file_name(missing))));
        }

        let mut store = Self {
            fs,
            root,
            manifest,
            open_index,
            open_records: Vec::new(),
            durable: true,
        };

        if present.contains(&open_index) {
            let mut shard = store.read_shard(open_index)?;
            shard.check_sequence(open_index, group_size)?;
            if shard.records.len() < expected_open {
                return Err(Error::format(format!(
                    "{} holds {} records, manifest expects {}",
                    shard_file_name(open_index),
                    shard.records.len(),
                    expected_open
                )));
            }
            if shard.records.len() > expected_open {
                let discarded = shard.records.len() - expected_open;
                warn!(shard = open_index, discarded, "Discarding records written after the last manifest");
                shard.records.truncate(expected_open);
                let repaired = shard.to_json()?;
                store.write_atomic(&shard_file_name(open_index), &repaired)?;
                store.open_records = shard.records;
            } else {
                store.open_records = shard.records;
            }
        } else if expected_open == 0 {
            warn!(shard = open_index, "Recreating missing open shard");
            store.write_atomic(&shard_file_name(open_index), &ShardFile::default().to_json()?)?;
        } else {
            return Err(Error::format(format!("missing shard {}", shard_file_name(open_index))));
        }

        info!(
            data_size = store.manifest.data_size,
            valid_size = store.manifest.valid_size,
            "Loaded record store"
        );
        Ok(store)
    }

    /// Load the store in `root` if it has a manifest, otherwise start afresh.
    ///
    /// A directory with files but no manifest is wiped first. The flag is true
    /// when a new store was created.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn auto_open(
        fs: Arc<dyn FileSystem>,
        root: impl AsRef<Path>,
        group_size: u64,
        kind: DataKind,
        windows: &[WindowSpec],
    ) -> Result<(Self, bool)> {
        let root = root.as_ref();
        if fs.exists(&root.join(MANIFEST_FILE_NAME)) {
            return Ok((Self::load(fs, root, kind)?, false));
        }
        if fs.exists(root) && !fs.list(root)?.is_empty() {
            warn!("Wiping directory without a manifest");
            fs.remove_dir_all(root)?;
        }
        Ok((Self::create(fs, root, group_size, kind, windows)?, true))
    }

    /// Recursively remove the store in `root`. Returns false if nothing was there.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn destroy(fs: &dyn FileSystem, root: impl AsRef<Path>) -> Result<bool> {
        let root = root.as_ref();
        if !fs.exists(root) {
            return Ok(false);
        }
        fs.remove_dir_all(root)?;
        info!("Deleted record store");
        Ok(true)
    }

    /// Delete this store's directory.
    pub fn delete(self) -> Result<bool> {
        Self::destroy(self.fs.as_ref(), &self.root)
    }

    /// Append the next sample together with the aggregate state after it.
    ///
    /// Fails without touching any state if the sample has the wrong kind or
    /// sequence, or if a previous unpersisted append still cannot be written.
    /// A write failure after the sample was accepted yields
    /// [`Error::NotDurable`]; [`sync`](Self::sync) retries it.
    pub fn append(&mut self, sample: Sample, snapshot: AggregateSnapshot) -> Result<()> {
        self.check_next(&sample)?;
        self.sync()?;

        self.open_records.push(sample);
        self.manifest = self.manifest.next(sample.is_valid(), snapshot);
        self.durable = false;

        self.persist().map_err(|e| Error::NotDurable {
            sequence: sample.sequence(),
            source: Box::new(e),
        })
    }

    /// Validate a sample against the store without changing anything.
    pub fn check_next(&self, sample: &Sample) -> Result<()> {
        if sample.kind() != self.manifest.data_type {
            return Err(Error::DataTypeMismatch {
                expected: self.manifest.data_type,
                actual: sample.kind(),
            });
        }
        if sample.sequence() != self.manifest.data_size {
            return Err(Error::InvalidSample(format!(
                "sequence {} does not follow {} stored samples",
                sample.sequence(),
                self.manifest.data_size
            )));
        }
        Ok(())
    }

    /// Write any state a failed append left in memory only.
    pub fn sync(&mut self) -> Result<()> {
        if self.durable {
            return Ok(());
        }
        debug!(data_size = self.manifest.data_size, "Retrying unpersisted append");
        self.persist()
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Write the open shard, rotate when it is full, then the manifest.
    ///
    /// Each step rewrites whole files, so rerunning after a partial failure
    /// converges to the same result.
    fn persist(&mut self) -> Result<()> {
        let group_size = self.manifest.group_size as usize;

        let open = ShardFile::new(self.open_records.clone());
        self.write_atomic(&shard_file_name(self.open_index), &open.to_json()?)?;

        if self.open_records.len() == group_size {
            self.write_atomic(&shard_file_name(self.open_index + 1), &ShardFile::default().to_json()?)?;
            self.open_index += 1;
            self.open_records.clear();
            debug!(shard = self.open_index, "Opened next shard");
        }

        self.write_atomic(MANIFEST_FILE_NAME, &self.manifest.to_json()?)?;
        self.durable = true;
        Ok(())
    }

    fn write_atomic(&self, name: &str, contents: &str) -> Result<()> {
        let target = self.root.join(name);
        let scratch = self.root.join(format!("{}{}", name, TMP_SUFFIX));
        self.fs.write(&scratch, contents, false)?;
        self.fs.rename(&scratch, &target)?;
        Ok(())
    }

    fn read_shard(&self, index: u64) -> Result<ShardFile> {
        let path = self.root.join(shard_file_name(index));
        let text = self.fs.read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::format(format!("missing shard {}", shard_file_name(index)))
            } else {
                Error::Io(e)
            }
        })?;
        ShardFile::parse(index, &text)
    }

    /// Read a closed shard, which must be full and contiguous.
    fn read_closed_shard(&self, index: u64) -> Result<Vec<Sample>> {
        let shard = self.read_shard(index)?;
        shard.check_sequence(index, self.manifest.group_size)?;
        if shard.records.len() as u64 != self.manifest.group_size {
            return Err(Error::format(format!(
                "{} holds {} records, expected {}",
                shard_file_name(index),
                shard.records.len(),
                self.manifest.group_size
            )));
        }
        Ok(shard.records)
    }

    /// The last `n` samples in sequence order, reading shards backwards only
    /// as far as needed.
    pub fn tail(&self, n: usize) -> Result<Vec<Sample>> {
        let wanted = n.min(self.manifest.data_size as usize);
        let mut chunks = vec![self.open_records.clone()];
        let mut collected = self.open_records.len();
        let mut index = self.open_index;

        while collected < wanted && index > 0 {
            index -= 1;
            let records = self.read_closed_shard(index)?;
            collected += records.len();
            chunks.push(records);
        }

        let mut samples: Vec<Sample> = chunks.into_iter().rev().flatten().collect();
        let excess = samples.len().saturating_sub(wanted);
        samples.drain(..excess);
        Ok(samples)
    }

    /// Every stored sample in sequence order.
    pub fn samples(&self) -> Result<Vec<Sample>> {
        let mut samples = Vec::with_capacity(self.manifest.data_size as usize);
        for index in 0..self.open_index {
            samples.extend(self.read_closed_shard(index)?);
        }
        samples.extend(self.open_records.iter().copied());
        Ok(samples)
    }

    /// The manifest fields plus a `records` array holding every sample.
    pub fn export(&self) -> Result<Value> {
        let mut document = serde_json::to_value(&self.manifest)?;
        let records = serde_json::to_value(self.samples()?)?;
        if let Value::Object(map) = &mut document {
            map.insert("records".to_string(), records);
        }
        Ok(document)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind(&self) -> DataKind {
        self.manifest.data_type
    }

    pub fn group_size(&self) -> u64 {
        self.manifest.group_size
    }

    /// Sequence number the next sample must carry.
    pub fn next_sequence(&self) -> u64 {
        self.manifest.data_size
    }
}
