//! Recorder: engine orchestration
//!
//! The recorder routes incoming samples to the right series buffer and slot
//! store, serves point and range queries by merging in-memory and persisted
//! data, and drives windowed reduction into target series.
//!
//! A series is created on first touch and stays active for the process
//! lifetime; its interpolation mode is fixed at creation and persisted as
//! JSON next to its slots. The recorder is not internally synchronized:
//! callers serialize concurrent access (one lock around the recorder, or a
//! single-writer discipline per deployment).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::interpolate;
use crate::storage::reduce::{window_ends, window_scan_range, ReductionKind};
use crate::storage::series::OrderedSeries;
use crate::storage::store::{SlotStore, StoreStats, SyncMode};
use crate::storage::types::{InterpolationMode, Sample, TimeRange};

/// Configuration for the recorder
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Root directory for all series
    pub data_dir: PathBuf,
    /// Slot window width in milliseconds (default: one day)
    pub slot_width: i64,
    /// Durability strategy for appends
    pub sync_mode: SyncMode,
    /// Interpolation mode given to series created implicitly by `record`
    pub default_mode: InterpolationMode,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("slotdb_data"),
            slot_width: 24 * 3600 * 1000,
            sync_mode: SyncMode::Batched,
            default_mode: InterpolationMode::None,
        }
    }
}

impl RecorderConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }
}

/// Per-series metadata persisted next to the slots
#[derive(Debug, Serialize, Deserialize)]
struct SeriesMeta {
    interpolation: InterpolationMode,
}

fn meta_path(series_dir: &Path) -> PathBuf {
    series_dir.join("meta.json")
}

fn save_meta(series_dir: &Path, mode: InterpolationMode) -> StorageResult<()> {
    std::fs::create_dir_all(series_dir)?;
    let meta = SeriesMeta {
        interpolation: mode,
    };
    std::fs::write(meta_path(series_dir), serde_json::to_string_pretty(&meta)?)?;
    Ok(())
}

fn load_meta(series_dir: &Path) -> StorageResult<Option<InterpolationMode>> {
    let path = meta_path(series_dir);
    if !path.exists() {
        return Ok(None);
    }
    let meta: SeriesMeta = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    Ok(Some(meta.interpolation))
}

struct SeriesState {
    /// Write-through view of samples recorded this session
    buffer: OrderedSeries,
    mode: InterpolationMode,
}

/// Result of a range query: the ordered samples plus the error that cut the
/// underlying scan short, if corruption was detected. Partial history stays
/// usable while the caller is still told.
#[derive(Debug)]
pub struct RangeData {
    pub samples: Vec<Sample>,
    pub error: Option<StorageError>,
}

impl RangeData {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Strict view: the samples, or the scan error if there was one.
    pub fn into_result(self) -> StorageResult<Vec<Sample>> {
        match self.error {
            None => Ok(self.samples),
            Some(e) => Err(e),
        }
    }
}

/// The recording engine.
pub struct Recorder {
    config: RecorderConfig,
    store: SlotStore,
    series: HashMap<String, SeriesState>,
}

impl Recorder {
    /// Open a recorder over a storage root, restoring known series.
    pub fn open(config: RecorderConfig) -> StorageResult<Self> {
        let store = SlotStore::open(&config.data_dir, config.slot_width, config.sync_mode)?;

        let mut series = HashMap::new();
        for id in store.series()? {
            let mode = load_meta(&store.series_dir(&id))?.unwrap_or(config.default_mode);
            series.insert(
                id,
                SeriesState {
                    buffer: OrderedSeries::new(),
                    mode,
                },
            );
        }
        if !series.is_empty() {
            tracing::info!(count = series.len(), "restored series");
        }

        Ok(Self {
            config,
            store,
            series,
        })
    }

    /// Create a series with an explicit interpolation mode. Idempotent when
    /// the mode matches; the mode of an existing series cannot change.
    pub fn create_series(&mut self, series_id: &str, mode: InterpolationMode) -> StorageResult<()> {
        if let Some(state) = self.series.get(series_id) {
            if state.mode == mode {
                return Ok(());
            }
            return Err(StorageError::Config(format!(
                "series {} already exists with mode {}",
                series_id, state.mode
            )));
        }

        save_meta(&self.store.series_dir(series_id), mode)?;
        self.series.insert(
            series_id.to_string(),
            SeriesState {
                buffer: OrderedSeries::new(),
                mode,
            },
        );
        tracing::info!(series = series_id, %mode, "created series");
        Ok(())
    }

    /// Record one sample, creating the series (default interpolation mode)
    /// on first use. The sample is persisted before it becomes visible in
    /// the in-memory buffer; a storage failure propagates to the producer
    /// and the sample is not buffered.
    pub fn record(&mut self, series_id: &str, sample: Sample) -> StorageResult<()> {
        if !self.series.contains_key(series_id) {
            self.create_series(series_id, self.config.default_mode)?;
        }
        self.store.append(series_id, &sample)?;
        self.series
            .get_mut(series_id)
            .expect("series state")
            .buffer
            .insert(sample);
        Ok(())
    }

    /// Record a batch of samples for one series.
    pub fn record_batch(&mut self, series_id: &str, samples: &[Sample]) -> StorageResult<()> {
        for sample in samples {
            self.record(series_id, *sample)?;
        }
        Ok(())
    }

    /// Force all pending slot state to disk.
    pub fn flush(&mut self) -> StorageResult<()> {
        self.store.flush()
    }

    /// Known series ids, sorted.
    pub fn series(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.series.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, series_id: &str) -> bool {
        self.series.contains_key(series_id)
    }

    /// The interpolation mode a series was created with.
    pub fn mode(&self, series_id: &str) -> StorageResult<InterpolationMode> {
        self.series
            .get(series_id)
            .map(|s| s.mode)
            .ok_or_else(|| StorageError::SeriesNotFound(series_id.to_string()))
    }

    /// Point query using the series' own interpolation mode.
    pub fn value_at(&mut self, series_id: &str, timestamp: i64) -> StorageResult<Option<Sample>> {
        let mode = self.mode(series_id)?;
        self.value_at_with_mode(series_id, timestamp, mode)
    }

    /// Point query with an explicit mode, merging buffered and persisted
    /// neighbors (the buffer wins on an equal timestamp).
    pub fn value_at_with_mode(
        &mut self,
        series_id: &str,
        timestamp: i64,
        mode: InterpolationMode,
    ) -> StorageResult<Option<Sample>> {
        let state = self
            .series
            .get(series_id)
            .ok_or_else(|| StorageError::SeriesNotFound(series_id.to_string()))?;
        let mem_prev = state.buffer.at_or_before(timestamp);
        let mem_next = state.buffer.at_or_after(timestamp);

        let disk_prev = self.store.last_at_or_before(series_id, timestamp)?;
        let disk_next = self.store.first_at_or_after(series_id, timestamp)?;

        let prev = match (mem_prev, disk_prev) {
            (Some(m), Some(d)) if d.timestamp > m.timestamp => Some(d),
            (Some(m), _) => Some(m),
            (None, d) => d,
        };
        let next = match (mem_next, disk_next) {
            (Some(m), Some(d)) if d.timestamp < m.timestamp => Some(d),
            (Some(m), _) => Some(m),
            (None, d) => d,
        };

        Ok(interpolate::value_at(prev, next, timestamp, mode))
    }

    /// Range query over `[from, to)`, validating the bounds.
    pub fn query(&mut self, series_id: &str, from: i64, to: i64) -> StorageResult<RangeData> {
        let range = TimeRange::try_new(from, to).ok_or(StorageError::InvalidTimeRange)?;
        self.query_range(series_id, range)
    }

    /// Range query merging persisted and buffered samples, ascending, the
    /// buffer winning on an equal timestamp. This is also the export
    /// surface: the result is ready for serialization by an outer layer.
    pub fn query_range(&mut self, series_id: &str, range: TimeRange) -> StorageResult<RangeData> {
        if !self.series.contains_key(series_id) {
            return Err(StorageError::SeriesNotFound(series_id.to_string()));
        }

        let (disk, error) = self.store.scan(series_id, range)?.collect_partial();
        let state = self.series.get(series_id).expect("series state");

        let mut merged = OrderedSeries::from_samples(disk);
        merged.extend(state.buffer.range(range));

        Ok(RangeData {
            samples: merged.iter().collect(),
            error,
        })
    }

    /// Reduce `source_id` over `[from, to)` into consecutive aligned windows
    /// of `window_width` ms, recording the output into `target_id` (created
    /// with the source's interpolation mode if missing).
    ///
    /// Windows are processed one at a time and each window's output is
    /// recorded before the next is computed, so an interrupted run loses at
    /// most one window and a re-run over the same input is idempotent.
    /// Returns the number of windows processed.
    pub fn reduce(
        &mut self,
        source_id: &str,
        from: i64,
        to: i64,
        window_width: i64,
        kind: ReductionKind,
        target_id: &str,
    ) -> StorageResult<usize> {
        if source_id == target_id {
            return Err(StorageError::Config(
                "reduction target must differ from source".into(),
            ));
        }
        let range = TimeRange::try_new(from, to).ok_or(StorageError::InvalidTimeRange)?;
        let source_mode = self.mode(source_id)?;
        let ends = window_ends(range, window_width)?;

        if !self.contains(target_id) {
            self.create_series(target_id, source_mode)?;
        }

        for end in &ends {
            let window = window_scan_range(*end, window_width);
            // A corrupt window aborts the run; windows already reduced stay
            // recorded, so a repaired store can resume from here.
            let data = self.query_range(source_id, window)?.into_result()?;
            for output in kind.reduce(&data, *end) {
                self.record(target_id, output)?;
            }
        }

        tracing::debug!(
            source = source_id,
            target = target_id,
            windows = ends.len(),
            strategy = %kind,
            "reduction complete"
        );
        Ok(ends.len())
    }

    /// Drop persisted slots fully older than `cutoff` and the matching part
    /// of the in-memory buffer. Returns the number of slots reclaimed.
    pub fn delete_before(&mut self, series_id: &str, cutoff: i64) -> StorageResult<usize> {
        let removed = self.store.delete_before(series_id, cutoff)?;
        if let Some(state) = self.series.get_mut(series_id) {
            // Only whole slots are reclaimed; the buffer follows the same
            // boundary.
            let boundary = cutoff.div_euclid(self.config.slot_width) * self.config.slot_width;
            state.buffer.remove_before(boundary);
        }
        Ok(removed)
    }

    /// Storage statistics.
    pub fn stats(&mut self) -> StorageResult<StoreStats> {
        self.store.stats()
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::Quality;
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> RecorderConfig {
        RecorderConfig {
            data_dir: dir.to_path_buf(),
            slot_width: 1000,
            sync_mode: SyncMode::EveryWrite,
            default_mode: InterpolationMode::None,
        }
    }

    fn open_recorder(dir: &Path) -> Recorder {
        Recorder::open(test_config(dir)).unwrap()
    }

    #[test]
    fn test_record_and_query() {
        let dir = tempdir().unwrap();
        let mut recorder = open_recorder(dir.path());

        for i in 0..10 {
            recorder
                .record("temp", Sample::new(i * 100, i as f64))
                .unwrap();
        }

        let data = recorder.query("temp", 0, 10_000).unwrap();
        assert!(data.is_complete());
        assert_eq!(data.samples.len(), 10);
        for pair in data.samples.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[test]
    fn test_query_invalid_range() {
        let dir = tempdir().unwrap();
        let mut recorder = open_recorder(dir.path());
        recorder.record("s", Sample::new(0, 1.0)).unwrap();

        assert!(matches!(
            recorder.query("s", 100, 50),
            Err(StorageError::InvalidTimeRange)
        ));
    }

    #[test]
    fn test_query_unknown_series() {
        let dir = tempdir().unwrap();
        let mut recorder = open_recorder(dir.path());
        assert!(matches!(
            recorder.query("ghost", 0, 100),
            Err(StorageError::SeriesNotFound(_))
        ));
    }

    #[test]
    fn test_replacement_wins() {
        let dir = tempdir().unwrap();
        let mut recorder = open_recorder(dir.path());

        recorder.record("s", Sample::new(500, 1.0)).unwrap();
        recorder.record("s", Sample::new(500, 2.0)).unwrap();

        let data = recorder.query("s", 0, 1000).unwrap();
        assert_eq!(data.samples.len(), 1);
        assert_eq!(data.samples[0].value, 2.0);

        let got = recorder.value_at("s", 500).unwrap().unwrap();
        assert_eq!(got.value, 2.0);
    }

    #[test]
    fn test_mode_fixed_at_creation_and_persisted() {
        let dir = tempdir().unwrap();

        {
            let mut recorder = open_recorder(dir.path());
            recorder
                .create_series("level", InterpolationMode::Linear)
                .unwrap();
            recorder.record("level", Sample::new(0, 10.0)).unwrap();
            recorder.record("level", Sample::new(10, 20.0)).unwrap();

            // Re-creating with the same mode is fine; another mode is not
            assert!(recorder
                .create_series("level", InterpolationMode::Linear)
                .is_ok());
            assert!(matches!(
                recorder.create_series("level", InterpolationMode::Steps),
                Err(StorageError::Config(_))
            ));
        }

        let mut recorder = open_recorder(dir.path());
        assert_eq!(
            recorder.mode("level").unwrap(),
            InterpolationMode::Linear
        );
        // Interpolated from disk alone after reopen
        let got = recorder.value_at("level", 5).unwrap().unwrap();
        assert_eq!(got.value, 15.0);
        assert_eq!(got.quality, Quality::Good);
    }

    #[test]
    fn test_value_at_reference_cases() {
        let dir = tempdir().unwrap();
        let mut recorder = open_recorder(dir.path());
        recorder.record("s", Sample::new(0, 10.0)).unwrap();
        recorder.record("s", Sample::new(10, 20.0)).unwrap();

        let linear = recorder
            .value_at_with_mode("s", 5, InterpolationMode::Linear)
            .unwrap()
            .unwrap();
        assert_eq!(linear.value, 15.0);
        assert_eq!(linear.quality, Quality::Good);

        let steps = recorder
            .value_at_with_mode("s", 5, InterpolationMode::Steps)
            .unwrap()
            .unwrap();
        assert_eq!(steps.value, 10.0);

        assert_eq!(
            recorder
                .value_at_with_mode("s", 5, InterpolationMode::None)
                .unwrap(),
            None
        );

        // Outside the stored range
        assert_eq!(
            recorder
                .value_at_with_mode("s", -5, InterpolationMode::Linear)
                .unwrap(),
            None
        );
        assert_eq!(
            recorder
                .value_at_with_mode("s", 15, InterpolationMode::Linear)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_value_at_merges_buffer_and_disk() {
        let dir = tempdir().unwrap();

        {
            let mut recorder = open_recorder(dir.path());
            recorder
                .create_series("s", InterpolationMode::Linear)
                .unwrap();
            recorder.record("s", Sample::new(0, 10.0)).unwrap();
            recorder.flush().unwrap();
        }

        // New session: the left neighbor lives only on disk, the right
        // neighbor only in this session's buffer.
        let mut recorder = open_recorder(dir.path());
        recorder.record("s", Sample::new(10, 20.0)).unwrap();

        let got = recorder.value_at("s", 5).unwrap().unwrap();
        assert_eq!(got.value, 15.0);
    }

    #[test]
    fn test_query_merges_across_reopen() {
        let dir = tempdir().unwrap();

        {
            let mut recorder = open_recorder(dir.path());
            recorder.record("s", Sample::new(100, 1.0)).unwrap();
            recorder.record("s", Sample::new(200, 2.0)).unwrap();
            recorder.flush().unwrap();
        }

        let mut recorder = open_recorder(dir.path());
        // Replace one persisted sample and add a new one
        recorder.record("s", Sample::new(200, 20.0)).unwrap();
        recorder.record("s", Sample::new(300, 3.0)).unwrap();

        let data = recorder.query("s", 0, 1000).unwrap();
        let got: Vec<(i64, f64)> = data.samples.iter().map(|s| (s.timestamp, s.value)).collect();
        assert_eq!(got, vec![(100, 1.0), (200, 20.0), (300, 3.0)]);
    }

    #[test]
    fn test_reduce_one_sample_per_window() {
        let dir = tempdir().unwrap();
        let mut recorder = open_recorder(dir.path());

        // Samples in windows (0,100] and (200,300]; (100,200] stays empty
        for ts in [50, 80, 250] {
            recorder.record("src", Sample::new(ts, ts as f64)).unwrap();
        }

        let windows = recorder
            .reduce("src", 0, 300, 100, ReductionKind::Average, "src_avg")
            .unwrap();
        assert_eq!(windows, 3);

        let data = recorder.query("src_avg", 0, 1000).unwrap();
        assert_eq!(data.samples.len(), 3);
        assert_eq!(data.samples[0].timestamp, 100);
        assert_eq!(data.samples[0].value, 65.0);
        assert_eq!(data.samples[0].quality, Quality::Good);

        // Empty window still yields a placeholder, flagged Bad
        assert_eq!(data.samples[1].timestamp, 200);
        assert_eq!(data.samples[1].value, 0.0);
        assert_eq!(data.samples[1].quality, Quality::Bad);

        assert_eq!(data.samples[2].timestamp, 300);
        assert_eq!(data.samples[2].value, 250.0);
    }

    #[test]
    fn test_reduce_idempotent() {
        let dir = tempdir().unwrap();
        let mut recorder = open_recorder(dir.path());

        for ts in [10, 20, 110, 120, 210] {
            recorder.record("src", Sample::new(ts, ts as f64)).unwrap();
        }

        recorder
            .reduce("src", 0, 300, 100, ReductionKind::Max, "src_max")
            .unwrap();
        let first = recorder.query("src_max", 0, 1000).unwrap().samples;

        recorder
            .reduce("src", 0, 300, 100, ReductionKind::Max, "src_max")
            .unwrap();
        let second = recorder.query("src_max", 0, 1000).unwrap().samples;

        assert_eq!(first, second);
    }

    #[test]
    fn test_reduce_rejects_bad_arguments() {
        let dir = tempdir().unwrap();
        let mut recorder = open_recorder(dir.path());
        recorder.record("src", Sample::new(0, 1.0)).unwrap();

        assert!(matches!(
            recorder.reduce("src", 0, 100, 0, ReductionKind::Average, "out"),
            Err(StorageError::InvalidWindow(0))
        ));
        assert!(matches!(
            recorder.reduce("src", 100, 0, 10, ReductionKind::Average, "out"),
            Err(StorageError::InvalidTimeRange)
        ));
        assert!(matches!(
            recorder.reduce("src", 0, 100, 10, ReductionKind::Average, "src"),
            Err(StorageError::Config(_))
        ));
        assert!(matches!(
            recorder.reduce("ghost", 0, 100, 10, ReductionKind::Average, "out"),
            Err(StorageError::SeriesNotFound(_))
        ));
    }

    #[test]
    fn test_delete_before_prunes_buffer_and_slots() {
        let dir = tempdir().unwrap();
        let mut recorder = open_recorder(dir.path());

        for ts in [100, 1100, 2100] {
            recorder.record("s", Sample::new(ts, ts as f64)).unwrap();
        }

        let removed = recorder.delete_before("s", 2000).unwrap();
        assert_eq!(removed, 2);

        let data = recorder.query("s", 0, 10_000).unwrap();
        let timestamps: Vec<i64> = data.samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![2100]);

        assert!(matches!(
            recorder.delete_before("ghost", 2000),
            Err(StorageError::SeriesNotFound(_))
        ));
    }

    #[test]
    fn test_series_listing_restored_on_open() {
        let dir = tempdir().unwrap();

        {
            let mut recorder = open_recorder(dir.path());
            recorder.record("a", Sample::new(0, 1.0)).unwrap();
            recorder.record("b", Sample::new(0, 1.0)).unwrap();
            recorder.flush().unwrap();
        }

        let recorder = open_recorder(dir.path());
        assert_eq!(recorder.series(), vec!["a", "b"]);
        assert!(recorder.contains("a"));
        assert!(!recorder.contains("c"));
    }

    #[test]
    fn test_bad_quality_flows_through_unchanged() {
        let dir = tempdir().unwrap();
        let mut recorder = open_recorder(dir.path());

        recorder.record("s", Sample::bad(100, 0.0)).unwrap();
        let data = recorder.query("s", 0, 1000).unwrap();
        assert_eq!(data.samples[0].quality, Quality::Bad);

        // Bad is data, not an error
        assert!(data.is_complete());
    }
}
