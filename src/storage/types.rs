//! Core data types for the slotdb recording engine
//!
//! This module defines the fundamental types used throughout the engine:
//! - `Sample`: one timestamped measurement
//! - `Quality`: validity flag on a sample
//! - `InterpolationMode`: how point queries between stored samples are answered
//! - `TimeRange`: a half-open time interval for range queries

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Validity flag on a [`Sample`].
///
/// `Bad` marks a placeholder or error value: the numeric value of a `Bad`
/// sample carries no meaning beyond "no data". It is in-band data, never an
/// error condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Good,
    Bad,
}

impl Quality {
    pub fn is_good(&self) -> bool {
        matches!(self, Quality::Good)
    }

    /// Combined quality of two inputs: `Good` only if both are `Good`.
    pub fn and(self, other: Quality) -> Quality {
        if self.is_good() && other.is_good() {
            Quality::Good
        } else {
            Quality::Bad
        }
    }
}

impl From<Quality> for u8 {
    fn from(q: Quality) -> u8 {
        match q {
            Quality::Good => 0,
            Quality::Bad => 1,
        }
    }
}

impl TryFrom<u8> for Quality {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(Quality::Good),
            1 => Ok(Quality::Bad),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quality::Good => write!(f, "good"),
            Quality::Bad => write!(f, "bad"),
        }
    }
}

/// A single time-series sample: one measurement at a point in time.
///
/// Immutable once constructed; an update is a new `Sample` at the same
/// timestamp superseding the old one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// The measured value
    pub value: f64,
    /// Validity of the value
    pub quality: Quality,
}

impl Sample {
    /// Create a sample with `Good` quality.
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp,
            value,
            quality: Quality::Good,
        }
    }

    /// Create a sample with an explicit quality.
    pub fn with_quality(timestamp: i64, value: f64, quality: Quality) -> Self {
        Self {
            timestamp,
            value,
            quality,
        }
    }

    /// Create a `Bad` placeholder sample. The value signals "no data",
    /// not a zero reading; callers must check quality before trusting it.
    pub fn bad(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp,
            value,
            quality: Quality::Bad,
        }
    }

    /// Create a `Good` sample stamped with the current wall-clock time.
    pub fn now(value: f64) -> Self {
        Self::new(Utc::now().timestamp_millis(), value)
    }

    pub fn is_good(&self) -> bool {
        self.quality.is_good()
    }
}

/// How point queries between stored samples are answered.
///
/// A series is associated with exactly one mode, fixed at creation. The mode
/// governs reads, not how storage is organized.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMode {
    /// Queries at non-stored timestamps return no value.
    #[default]
    None,
    /// Zero-order hold: the value of the latest sample at or before T.
    Steps,
    /// Linear interpolation between the neighboring stored samples;
    /// absent outside the stored range.
    Linear,
}

impl std::str::FromStr for InterpolationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(InterpolationMode::None),
            "steps" => Ok(InterpolationMode::Steps),
            "linear" => Ok(InterpolationMode::Linear),
            other => Err(format!("unknown interpolation mode: {}", other)),
        }
    }
}

impl std::fmt::Display for InterpolationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterpolationMode::None => write!(f, "none"),
            InterpolationMode::Steps => write!(f, "steps"),
            InterpolationMode::Linear => write!(f, "linear"),
        }
    }
}

/// Time range for queries (half-open interval: [start, end)), in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Start timestamp (inclusive)
    pub start: i64,
    /// End timestamp (exclusive)
    pub end: i64,
}

impl TimeRange {
    /// Create a new time range.
    ///
    /// # Panics
    /// Panics if start > end. An empty range (start == end) is allowed.
    pub fn new(start: i64, end: i64) -> Self {
        assert!(start <= end, "TimeRange: start must not exceed end");
        Self { start, end }
    }

    /// Create a time range, returning None if start > end.
    pub fn try_new(start: i64, end: i64) -> Option<Self> {
        if start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Range for the last N minutes from now.
    pub fn last_minutes(minutes: i64) -> Self {
        let end = Utc::now().timestamp_millis();
        Self {
            start: end - minutes * 60 * 1000,
            end,
        }
    }

    /// Range for the last N hours from now.
    pub fn last_hours(hours: i64) -> Self {
        Self::last_minutes(hours * 60)
    }

    /// Range for the last N days from now.
    pub fn last_days(days: i64) -> Self {
        Self::last_hours(days * 24)
    }

    /// Check if a timestamp falls within this range.
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Check if this range overlaps with another.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Duration in milliseconds.
    pub fn duration_millis(&self) -> i64 {
        self.end - self.start
    }

    /// Intersection with another range, if any.
    pub fn intersection(&self, other: &TimeRange) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}
