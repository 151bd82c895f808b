#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Shared types for the Vision Zero canonical dataset.
//!
//! Crash and concern events, road segment identifiers, time buckets, and
//! the row shapes written to the canonical and adjacency tables. Every
//! other crate in the workspace speaks in these types.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Number of week buckets per segment in the dense panel.
///
/// A calendar year touches at most 53 ISO weeks, so weeks `1..=53` cover
/// every partial leading or trailing week.
pub const WEEKS_PER_YEAR: u32 = 53;

/// Property name holding the nearest segment id on a joined event.
pub const NEAR_ID_FIELD: &str = "near_id";

/// Returns the inclusive range of week buckets, `1..=53`.
#[must_use]
pub const fn week_range() -> RangeInclusive<u32> {
    1..=WEEKS_PER_YEAR
}

/// Canonical identifier of a road segment.
///
/// Segment ids arrive as JSON strings from some sources and as numbers from
/// others. They are always stored as strings so that `12`, `12.0`, and
/// `"12"` all compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    /// Creates a segment id from an already-canonical string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Converts a JSON value into a canonical segment id.
    ///
    /// Integers and integral floats become plain decimal strings. Strings
    /// are trimmed and kept verbatim otherwise, so `"001"` stays distinct
    /// from `"1"`. Returns `None` for null, empty strings, and non-scalar
    /// values.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Self(trimmed.to_string()))
                }
            }
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Some(Self(i.to_string()));
                }
                if let Some(u) = n.as_u64() {
                    return Some(Self(u.to_string()));
                }
                let f = n.as_f64()?;
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
                    Some(Self((f as i64).to_string()))
                } else {
                    Some(Self(f.to_string()))
                }
            }
            _ => None,
        }
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SegmentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The kind of point event feeding the dataset.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    /// A reported traffic crash.
    Crash,
    /// A citizen-submitted safety concern.
    Concern,
}

impl EventKind {
    /// Returns the timestamp field used by standardized records of this kind.
    #[must_use]
    pub const fn default_timestamp_field(self) -> &'static str {
        match self {
            Self::Crash => "dateOccurred",
            Self::Concern => "dateCreated",
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Crash, Self::Concern]
    }
}

/// Travel mode of the party involved in a crash.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TravelMode {
    /// Motor vehicle only.
    Vehicle,
    /// A pedestrian was involved.
    Pedestrian,
    /// A cyclist was involved.
    Bike,
}

/// Calendar part used to bucket event timestamps.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DatePart {
    /// ISO week of the year, 1-53.
    #[default]
    Week,
    /// Month of the year, 1-12.
    Month,
    /// Day of the month, 1-31.
    Day,
    /// Day of the week, Monday = 0.
    Weekday,
    /// Hour of the day, 0-23.
    Hour,
    /// Calendar year.
    Year,
}

/// How duplicate segment ids combine their road feature values.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Reducer {
    /// Largest value across duplicates.
    #[default]
    Max,
    /// Smallest value across duplicates.
    Min,
    /// Sum of all values.
    Sum,
    /// Arithmetic mean of all values.
    Mean,
    /// First value in source order.
    First,
    /// Last value in source order.
    Last,
}

/// Event counts keyed by (segment id, date-part value).
pub type BucketCounts = BTreeMap<(SegmentId, u32), u64>;

/// One row of the canonical dataset: a segment in a given week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRow {
    /// Road segment this row describes.
    pub segment_id: SegmentId,
    /// ISO week number, 1-53.
    pub week: u32,
    /// Crashes on this segment during this week.
    pub crash: u64,
    /// Concerns on this segment during this week.
    pub concern: u64,
    /// Static road features, in the order of the requested feature columns.
    /// `None` when the segment has no value for that feature.
    pub features: Vec<Option<i64>>,
}

/// One row of the adjacency table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjacencyRow {
    /// Road segment id.
    pub segment_id: SegmentId,
    /// Source map feature the segment was built from.
    pub orig_id: Option<String>,
    /// Address of a traffic counter station snapped to this segment.
    pub atr_address: Option<String>,
}

/// Summary of all crashes reported at one exact location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashRollup {
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Number of crashes at this location.
    pub total_crashes: u64,
    /// Crashes involving a pedestrian.
    pub pedestrian: u64,
    /// Crashes involving a cyclist.
    pub bike: u64,
    /// Vehicle-only crashes.
    pub vehicle: u64,
    /// Original crash timestamps, comma-joined in input order.
    pub crash_dates: String,
}

/// Per-segment grouping of joined records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationGroup {
    /// Number of records sharing this segment id.
    pub count: u64,
    /// Values of each requested extra field, for records that carry it.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Vec<serde_json::Value>>,
}
