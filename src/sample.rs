//! Samples: the atomic measurement unit recorded by the engine.
//!
//! A sample is a timing value or the DNF ("did not finish") sentinel. DNF is
//! held as positive infinity in memory and written as `null` on disk, so it
//! never reaches the arithmetic of an aggregate as a finite number.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// In-memory representation of a "did not finish" measurement.
pub const DNF: f64 = f64::INFINITY;

/// Whether a value is the DNF sentinel.
#[inline]
pub fn is_dnf(value: f64) -> bool {
    value == DNF
}

/// The kinds of samples a store can hold.
///
/// Persisted as the integer `data_type` in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum DataKind {
    /// Reaction time of one attempt in a number test session
    NumberResponse,
}

impl DataKind {
    /// Integer code written to the manifest.
    pub const fn code(self) -> i64 {
        match self {
            DataKind::NumberResponse => 0,
        }
    }
}

impl From<DataKind> for i64 {
    fn from(kind: DataKind) -> Self {
        kind.code()
    }
}

impl TryFrom<i64> for DataKind {
    type Error = String;

    fn try_from(code: i64) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(DataKind::NumberResponse),
            other => Err(format!("unknown data type {}", other)),
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::NumberResponse => write!(f, "number_response"),
        }
    }
}

/// Outcome of comparing two valid samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Better,
    Equal,
    Worse,
}

/// One reaction time: `serial` is the sequence number, `time` the measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumberResponse {
    pub serial: u64,
    #[serde(default = "dnf", with = "dnf_as_null")]
    pub time: f64,
}

fn dnf() -> f64 {
    DNF
}

/// A recorded sample, one variant per [`DataKind`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sample {
    NumberResponse(NumberResponse),
}

impl Sample {
    /// Create a number response, rejecting values that are not a time or DNF.
    pub fn number_response(sequence: u64, time: f64) -> Result<Self> {
        if time.is_nan() {
            return Err(Error::InvalidSample("time is NaN".to_string()));
        }
        if time == f64::NEG_INFINITY {
            return Err(Error::InvalidSample("time is negative infinity".to_string()));
        }
        Ok(Sample::NumberResponse(NumberResponse {
            serial: sequence,
            time,
        }))
    }

    /// Create a DNF number response.
    pub fn dnf(sequence: u64) -> Self {
        Sample::NumberResponse(NumberResponse {
            serial: sequence,
            time: DNF,
        })
    }

    pub fn kind(&self) -> DataKind {
        match self {
            Sample::NumberResponse(_) => DataKind::NumberResponse,
        }
    }

    pub fn sequence(&self) -> u64 {
        match self {
            Sample::NumberResponse(r) => r.serial,
        }
    }

    /// The raw measurement, [`DNF`] when the attempt did not finish.
    pub fn value(&self) -> f64 {
        match self {
            Sample::NumberResponse(r) => r.time,
        }
    }

    /// A sample is valid iff it is not DNF.
    pub fn is_valid(&self) -> bool {
        !is_dnf(self.value())
    }

    /// Compare two valid samples.
    ///
    /// The smaller absolute value is better; on equal magnitude the higher
    /// sequence number is better. Returns `None` when either sample is DNF or
    /// the kinds differ.
    pub fn compare(&self, other: &Sample) -> Option<Comparison> {
        if !self.is_valid() || !other.is_valid() || self.kind() != other.kind() {
            return None;
        }

        match (self, other) {
            (Sample::NumberResponse(a), Sample::NumberResponse(b)) => {
                let (this, that) = (a.time.abs(), b.time.abs());
                if this < that {
                    return Some(Comparison::Better);
                }
                if this > that {
                    return Some(Comparison::Worse);
                }
                Some(match a.serial.cmp(&b.serial) {
                    std::cmp::Ordering::Greater => Comparison::Better,
                    std::cmp::Ordering::Less => Comparison::Worse,
                    std::cmp::Ordering::Equal => Comparison::Equal,
                })
            }
        }
    }
}

/// `time` is written as a number, or `null` for DNF.
mod dnf_as_null {
    use super::{is_dnf, DNF};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if is_dnf(*value) {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(DNF))
    }
}
