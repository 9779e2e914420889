//! Common test utilities for store and recorder tests

#![allow(dead_code)]

use onesec_core::{LocalFileSystem, MemoryFileSystem, Sample};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A store directory on the real filesystem, removed on drop
pub struct TestStore {
    pub dir: TempDir,
    pub fs: Arc<LocalFileSystem>,
}

impl TestStore {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
            fs: Arc::new(LocalFileSystem),
        }
    }

    /// Store root inside the temp dir; not created until the store is
    pub fn root(&self) -> PathBuf {
        self.dir.path().join("records")
    }
}

pub fn memory_fs() -> Arc<MemoryFileSystem> {
    Arc::new(MemoryFileSystem::new())
}

/// Deterministic mix of signed times and DNFs, all multiples of 1/64
pub fn measurements(count: usize) -> Vec<Option<f64>> {
    let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
    (0..count)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let bucket = (state >> 40) % 256;
            if bucket < 10 {
                None
            } else {
                Some(bucket as f64 / 64.0 - 1.5)
            }
        })
        .collect()
}

/// Times on a 0.0031 step with occasional negatives and DNFs; none of
/// them are exact in binary, so running sums pick up rounding error
pub fn drifting_measurements(count: usize) -> Vec<Option<f64>> {
    (0..count)
        .map(|k| {
            let time = 0.2 + k as f64 * 0.0031;
            match k % 19 {
                11 => None,
                3 | 14 => Some(-time),
                _ => Some(time),
            }
        })
        .collect()
}

pub fn shard_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read store dir")
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("data") && name.ends_with(".json"))
        .collect();
    names.sort();
    names
}

pub fn read_shard(dir: &Path, index: u64) -> serde_json::Value {
    let text = std::fs::read_to_string(dir.join(format!("data{}.json", index))).expect("read shard");
    serde_json::from_str(&text).expect("parse shard")
}

pub fn sequences(samples: &[Sample]) -> Vec<u64> {
    samples.iter().map(Sample::sequence).collect()
}
