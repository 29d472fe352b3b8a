//! Types of the measurement protocol shared by all transmitters.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// The tag set of a [`Measurement`].
///
/// Tags are sorted by key, which gives serialized measurements a stable form.
pub type TagMap = BTreeMap<String, String>;

/// Error returned when a non-finite float is converted into [`FiniteF64`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("float is nan or infinite")]
pub struct TryFromFloatError;

/// A finite 64-bit floating point value.
///
/// Measurement values take part in equality and hashing, which a raw [`f64`]
/// does not support. `FiniteF64` rejects NaN and infinities at construction,
/// making equality reflexive and hashing well-defined. Negative zero compares
/// and hashes equal to zero.
#[derive(Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(into = "f64", try_from = "f64")]
pub struct FiniteF64(f64);

impl FiniteF64 {
    /// Creates a finite float if the value is neither NaN nor infinite.
    pub fn new(value: f64) -> Option<Self> {
        value.is_finite().then_some(Self(value))
    }

    /// Returns the plain [`f64`].
    pub fn to_f64(self) -> f64 {
        self.0
    }

    /// Bit pattern with `-0.0` normalized to `0.0`, so that hashing agrees
    /// with equality.
    fn to_bits(self) -> u64 {
        if self.0 == 0.0 { 0.0_f64 } else { self.0 }.to_bits()
    }
}

impl Eq for FiniteF64 {}

impl Ord for FiniteF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        // Total order agrees with the numeric order since both values are
        // finite and zeros are normalized.
        let this = if self.0 == 0.0 { 0.0 } else { self.0 };
        let that = if other.0 == 0.0 { 0.0 } else { other.0 };
        this.total_cmp(&that)
    }
}

impl Hash for FiniteF64 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.to_bits());
    }
}

impl fmt::Debug for FiniteF64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for FiniteF64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<FiniteF64> for f64 {
    fn from(value: FiniteF64) -> Self {
        value.0
    }
}

impl TryFrom<f64> for FiniteF64 {
    type Error = TryFromFloatError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(TryFromFloatError)
    }
}

macro_rules! finite_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FiniteF64 {
                fn from(value: $ty) -> Self {
                    Self(value.into())
                }
            }
        )*
    };
}

finite_from!(i8, u8, i16, u16, i32, u32);

/// A single observed value for a named property at a given instant.
///
/// Measurements are immutable: the timestamp is captured once at construction
/// and no field can be changed afterwards.
///
/// Two measurements are considered equal if they have the same name, value and
/// timestamp. Tags are deliberately excluded from identity, mirroring how the
/// buffer deduplicates entries (see
/// [`MeasurementBuffer`](crate::MeasurementBuffer)).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Measurement {
    name: String,
    value: FiniteF64,
    tags: TagMap,
    timestamp: DateTime<Utc>,
}

impl Measurement {
    /// Creates a measurement observed now.
    pub fn new(name: impl Into<String>, value: FiniteF64, tags: TagMap) -> Self {
        Self::at(name, value, tags, Utc::now())
    }

    /// Creates a measurement with an explicit capture timestamp.
    ///
    /// Useful for replaying past observations and for tests that need a frozen
    /// clock.
    pub fn at(
        name: impl Into<String>,
        value: FiniteF64,
        tags: TagMap,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            tags,
            timestamp,
        }
    }

    /// The name of the property this measurement was observed for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The observed value.
    pub fn value(&self) -> FiniteF64 {
        self.value
    }

    /// The tags attached to this measurement. May be empty.
    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    /// The instant at which this measurement was captured.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The capture timestamp rendered as an RFC 3339 / ISO 8601 string in UTC.
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl PartialEq for Measurement {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.value == other.value
            && self.timestamp == other.timestamp
    }
}

impl Eq for Measurement {}

impl Hash for Measurement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.value.hash(state);
        self.timestamp.hash(state);
    }
}
