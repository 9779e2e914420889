//! Shard files: fixed-capacity groups of consecutive samples.
//!
//! Shard `i` is stored as `data<i>.json` and holds the samples whose sequence
//! lies in `[i * group_size, (i + 1) * group_size)`. This addressing is part of
//! the on-disk contract.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{Error, Result};
use crate::sample::Sample;

pub const DATA_FILE_PREFIX: &str = "data";
pub const JSON_EXTENSION: &str = ".json";

/// Index of the shard holding `sequence`.
pub fn shard_index(sequence: u64, group_size: u64) -> u64 {
    sequence / group_size
}

/// Sequence numbers belonging to shard `index`.
pub fn shard_range(index: u64, group_size: u64) -> Range<u64> {
    index * group_size..(index + 1) * group_size
}

pub fn shard_file_name(index: u64) -> String {
    format!("{}{}{}", DATA_FILE_PREFIX, index, JSON_EXTENSION)
}

/// Parse `data<digits>.json` back into a shard index.
pub fn parse_shard_file_name(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(DATA_FILE_PREFIX)?.strip_suffix(JSON_EXTENSION)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Contents of one shard file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardFile {
    pub records: Vec<Sample>,
}

impl ShardFile {
    pub fn new(records: Vec<Sample>) -> Self {
        Self { records }
    }

    pub fn parse(index: u64, text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::format(format!("corrupt shard {}: {}", shard_file_name(index), e)))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that records carry consecutive sequence numbers starting at the
    /// first sequence of shard `index`.
    pub fn check_sequence(&self, index: u64, group_size: u64) -> Result<()> {
        let range = shard_range(index, group_size);
        for (offset, record) in self.records.iter().enumerate() {
            let expected = range.start + offset as u64;
            if record.sequence() != expected {
                return Err(Error::format(format!(
                    "{} holds sequence {} where {} was expected",
                    shard_file_name(index),
                    record.sequence(),
                    expected
                )));
            }
        }
        Ok(())
    }
}
