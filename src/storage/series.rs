//! In-memory ordered series
//!
//! `OrderedSeries` is a timestamp-ordered container of samples for one
//! logical channel, backed by a `BTreeMap` so that insertion, removal, and
//! the predecessor/successor lookups needed by interpolation and reduction
//! are all O(log n).
//!
//! Not thread-safe: concurrent write/write or write/read access to the same
//! series must be serialized by the caller.

use std::collections::BTreeMap;

use crate::storage::interpolate;
use crate::storage::types::{InterpolationMode, Sample, TimeRange};

/// Timestamp-ordered set of samples, unique per timestamp.
#[derive(Debug, Clone, Default)]
pub struct OrderedSeries {
    samples: BTreeMap<i64, Sample>,
}

impl OrderedSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from any sample source. Later samples replace earlier
    /// ones at the same timestamp.
    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        let mut series = Self::new();
        for sample in samples {
            series.insert(sample);
        }
        series
    }

    /// Insert a sample, replacing any existing sample at the same timestamp.
    /// Returns the replaced sample, if any.
    pub fn insert(&mut self, sample: Sample) -> Option<Sample> {
        self.samples.insert(sample.timestamp, sample)
    }

    /// Remove the sample at `timestamp`, returning it if present.
    pub fn remove(&mut self, timestamp: i64) -> Option<Sample> {
        self.samples.remove(&timestamp)
    }

    /// Stored sample at exactly `timestamp`.
    pub fn get(&self, timestamp: i64) -> Option<Sample> {
        self.samples.get(&timestamp).copied()
    }

    /// Latest sample with timestamp <= `timestamp`.
    pub fn at_or_before(&self, timestamp: i64) -> Option<Sample> {
        self.samples
            .range(..=timestamp)
            .next_back()
            .map(|(_, s)| *s)
    }

    /// Earliest sample with timestamp >= `timestamp`.
    pub fn at_or_after(&self, timestamp: i64) -> Option<Sample> {
        self.samples.range(timestamp..).next().map(|(_, s)| *s)
    }

    /// Point query applying the interpolation rules for `mode`.
    /// Absence is a normal answer, not an error.
    pub fn value_at(&self, timestamp: i64, mode: InterpolationMode) -> Option<Sample> {
        interpolate::value_at(
            self.at_or_before(timestamp),
            self.at_or_after(timestamp),
            timestamp,
            mode,
        )
    }

    /// Lazy ascending iteration over `[range.start, range.end)`. Restartable:
    /// each call yields a fresh iterator.
    pub fn range(&self, range: TimeRange) -> impl Iterator<Item = Sample> + '_ {
        self.samples.range(range.start..range.end).map(|(_, s)| *s)
    }

    /// Ascending iteration over the whole series.
    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.samples.values().copied()
    }

    pub fn first(&self) -> Option<Sample> {
        self.samples.values().next().copied()
    }

    pub fn last(&self) -> Option<Sample> {
        self.samples.values().next_back().copied()
    }

    /// Remove every sample with timestamp < `timestamp`, returning how many
    /// were dropped.
    pub fn remove_before(&mut self, timestamp: i64) -> usize {
        let kept = self.samples.split_off(&timestamp);
        let removed = self.samples.len();
        self.samples = kept;
        removed
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Extend<Sample> for OrderedSeries {
    fn extend<T: IntoIterator<Item = Sample>>(&mut self, iter: T) {
        for sample in iter {
            self.insert(sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::Quality;

    fn series_of(points: &[(i64, f64)]) -> OrderedSeries {
        OrderedSeries::from_samples(points.iter().map(|&(t, v)| Sample::new(t, v)))
    }

    #[test]
    fn test_insert_replaces_same_timestamp() {
        let mut series = OrderedSeries::new();
        series.insert(Sample::new(1000, 1.0));
        let replaced = series.insert(Sample::new(1000, 2.0));

        assert_eq!(replaced.map(|s| s.value), Some(1.0));
        assert_eq!(series.len(), 1);
        assert_eq!(
            series.value_at(1000, InterpolationMode::None).map(|s| s.value),
            Some(2.0)
        );
    }

    #[test]
    fn test_remove() {
        let mut series = series_of(&[(1000, 1.0), (2000, 2.0)]);
        assert_eq!(series.remove(1000).map(|s| s.value), Some(1.0));
        assert_eq!(series.remove(1000), None);
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_range_is_ordered_and_half_open() {
        let series = series_of(&[(3000, 3.0), (1000, 1.0), (2000, 2.0), (4000, 4.0)]);
        let got: Vec<i64> = series
            .range(TimeRange::new(1000, 4000))
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(got, vec![1000, 2000, 3000]);

        // Strictly increasing, no duplicates
        for window in got.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn test_range_restartable() {
        let series = series_of(&[(1000, 1.0), (2000, 2.0)]);
        let range = TimeRange::new(0, 5000);
        assert_eq!(series.range(range).count(), 2);
        assert_eq!(series.range(range).count(), 2);
    }

    #[test]
    fn test_first_last() {
        let series = series_of(&[(2000, 2.0), (1000, 1.0), (3000, 3.0)]);
        assert_eq!(series.first().map(|s| s.timestamp), Some(1000));
        assert_eq!(series.last().map(|s| s.timestamp), Some(3000));

        let empty = OrderedSeries::new();
        assert_eq!(empty.first(), None);
        assert_eq!(empty.last(), None);
    }

    #[test]
    fn test_neighbor_lookups() {
        let series = series_of(&[(1000, 1.0), (3000, 3.0)]);

        assert_eq!(series.at_or_before(2000).map(|s| s.timestamp), Some(1000));
        assert_eq!(series.at_or_before(3000).map(|s| s.timestamp), Some(3000));
        assert_eq!(series.at_or_before(500), None);

        assert_eq!(series.at_or_after(2000).map(|s| s.timestamp), Some(3000));
        assert_eq!(series.at_or_after(1000).map(|s| s.timestamp), Some(1000));
        assert_eq!(series.at_or_after(3500), None);
    }

    #[test]
    fn test_value_at_modes() {
        // The reference case: (0,10) and (10,20)
        let series = series_of(&[(0, 10.0), (10, 20.0)]);

        let linear = series.value_at(5, InterpolationMode::Linear).unwrap();
        assert_eq!(linear.value, 15.0);
        assert_eq!(linear.quality, Quality::Good);

        let steps = series.value_at(5, InterpolationMode::Steps).unwrap();
        assert_eq!(steps.value, 10.0);
        assert_eq!(steps.quality, Quality::Good);

        assert_eq!(series.value_at(5, InterpolationMode::None), None);
    }

    #[test]
    fn test_value_at_linear_outside_range() {
        let series = series_of(&[(10, 1.0), (20, 2.0)]);
        assert_eq!(series.value_at(5, InterpolationMode::Linear), None);
        assert_eq!(series.value_at(25, InterpolationMode::Linear), None);
    }

    #[test]
    fn test_remove_before() {
        let mut series = series_of(&[(1000, 1.0), (2000, 2.0), (3000, 3.0)]);
        assert_eq!(series.remove_before(2000), 1);
        assert_eq!(series.first().map(|s| s.timestamp), Some(2000));
        assert_eq!(series.remove_before(10_000), 2);
        assert!(series.is_empty());
    }

    #[test]
    fn test_value_at_exact_after_insert() {
        let mut series = OrderedSeries::new();
        series.insert(Sample::new(42, 4.2));
        let got = series.value_at(42, InterpolationMode::None).unwrap();
        assert_eq!(got.value, 4.2);
    }
}
