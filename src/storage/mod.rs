//! Persistent storage for recorded samples.
//!
//! A store is a directory with a manifest and fixed-size shard files. All
//! file access goes through the [`FileSystem`] trait.

pub mod fs;
pub mod manifest;
pub mod shard;
pub mod store;

pub use fs::{FileSystem, LocalFileSystem, MemoryFileSystem};
pub use manifest::{AggregateSnapshot, Manifest, WindowSnapshot, MANIFEST_FILE_NAME, MANIFEST_VERSION};
pub use shard::{shard_file_name, shard_index, ShardFile};
pub use store::RecordStore;
