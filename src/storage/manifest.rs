//! The store manifest: counts plus the aggregate snapshot needed to resume.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::sample::{DataKind, Sample};
use crate::statistics::Statistics;
use crate::window::{WindowAggregator, WindowSpec};

/// Manifest format version written by this crate.
pub const MANIFEST_VERSION: &str = "1.0";

/// File name of the manifest inside a store directory.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Persisted state of one window aggregator.
///
/// `current` is omitted when the window has not produced a result yet and
/// written as `null` when the newest result is DNF.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "current_or_dnf")]
    pub current: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    /// Results folded into `average`
    #[serde(default, skip_serializing_if = "is_zero")]
    pub count: u64,
    /// Running sum of the finite values in the window, absent before the
    /// first insertion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl WindowSnapshot {
    /// Capture an aggregator after it returned `current`.
    pub fn capture(current: Option<f64>, aggregator: &WindowAggregator) -> Self {
        Self {
            current,
            best: aggregator.best(),
            worst: aggregator.worst(),
            average: aggregator.average(),
            count: aggregator.effective_count(),
            sum: (aggregator.inserted() > 0).then(|| aggregator.sum()),
        }
    }

    pub fn statistics(&self) -> Statistics<f64> {
        Statistics::new(self.current, self.best, self.worst, self.average)
    }
}

/// Everything the recorder hands to the store alongside a new sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSnapshot {
    pub all: Statistics<Sample>,
    pub windows: BTreeMap<WindowSpec, WindowSnapshot>,
}

/// Contents of `manifest.json`.
///
/// Window snapshots are stored at the top level under their keys
/// (`mo3`, `ao5`, ...). A manifest value is never edited in place: each
/// append derives the next one with [`Manifest::next`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub data_type: DataKind,
    pub group_size: u64,
    /// Samples written, DNF included
    pub data_size: u64,
    /// Samples written, DNF excluded
    pub valid_size: u64,
    #[serde(default)]
    pub all: Statistics<Sample>,
    #[serde(flatten)]
    pub windows: BTreeMap<WindowSpec, WindowSnapshot>,
}

impl Manifest {
    /// Manifest of an empty store.
    pub fn new(kind: DataKind, group_size: u64, windows: &[WindowSpec]) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            data_type: kind,
            group_size,
            data_size: 0,
            valid_size: 0,
            all: Statistics::default(),
            windows: windows
                .iter()
                .map(|spec| (*spec, WindowSnapshot::default()))
                .collect(),
        }
    }

    /// The manifest after one more sample has been appended.
    pub fn next(&self, valid: bool, snapshot: AggregateSnapshot) -> Self {
        Self {
            version: self.version.clone(),
            data_type: self.data_type,
            group_size: self.group_size,
            data_size: self.data_size + 1,
            valid_size: self.valid_size + u64::from(valid),
            all: snapshot.all,
            windows: snapshot.windows,
        }
    }

    /// Parse and validate a manifest for a store of `kind`.
    pub fn parse(text: &str, kind: DataKind) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(text)
            .map_err(|e| Error::format(format!("corrupt manifest: {}", e)))?;

        if manifest.version != MANIFEST_VERSION {
            return Err(Error::format(format!(
                "unsupported manifest version {}, expected {}",
                manifest.version, MANIFEST_VERSION
            )));
        }
        if manifest.data_type != kind {
            return Err(Error::format(format!(
                "store holds {} data, expected {}",
                manifest.data_type, kind
            )));
        }
        if manifest.group_size == 0 {
            return Err(Error::format("group_size must be positive"));
        }
        if manifest.valid_size > manifest.data_size {
            return Err(Error::format(format!(
                "valid_size {} exceeds data_size {}",
                manifest.valid_size, manifest.data_size
            )));
        }

        Ok(manifest)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Window configurations recorded in this manifest, in key order.
    pub fn window_specs(&self) -> Vec<WindowSpec> {
        self.windows.keys().copied().collect()
    }
}

mod current_or_dnf {
    use crate::sample::{is_dnf, DNF};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) if !is_dnf(*v) => serializer.serialize_f64(*v),
            _ => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Ok(Some(Option::<f64>::deserialize(deserializer)?.unwrap_or(DNF)))
    }
}
