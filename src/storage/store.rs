//! Slot store
//!
//! Durable, append-optimized persistence keyed by `(series_id, timestamp)`.
//! Each series owns a sub-directory of the storage root (its id
//! percent-encoded into a filesystem-safe name); within it, one slot file
//! per elapsed time window, named by slot index.
//!
//! The store is not internally synchronized, and exactly one `SlotStore`
//! must own a given storage root at a time; concurrent opens of the same
//! root require external coordination.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::slot::{Slot, SlotRecordIter, RECORD_SIZE};
use crate::storage::types::{Sample, TimeRange};

/// Durability strategy for appends.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Header rewrite + fsync after every append (safest, slowest)
    EveryWrite,
    /// Fsync once a byte threshold accumulates, and on flush (balanced)
    #[default]
    Batched,
    /// No fsync, rely on the OS (fastest, crash may lose the tail)
    None,
}

/// Slot store over one storage root.
pub struct SlotStore {
    root: PathBuf,
    slot_width: i64,
    sync_mode: SyncMode,
    /// Batched-mode threshold in bytes
    sync_threshold: usize,
    bytes_since_sync: usize,
    /// Currently open append target per series
    active: HashMap<String, Slot>,
}

impl SlotStore {
    /// Open a store, creating the root directory if needed.
    pub fn open(
        root: impl Into<PathBuf>,
        slot_width: i64,
        sync_mode: SyncMode,
    ) -> StorageResult<Self> {
        if slot_width <= 0 {
            return Err(StorageError::Config(format!(
                "slot width must be positive, got {} ms",
                slot_width
            )));
        }
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        tracing::info!(root = %root.display(), slot_width, "opened slot store");

        Ok(Self {
            root,
            slot_width,
            sync_mode,
            sync_threshold: 64 * 1024,
            bytes_since_sync: 0,
            active: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn slot_width(&self) -> i64 {
        self.slot_width
    }

    /// Directory holding one series' slots.
    pub fn series_dir(&self, series_id: &str) -> PathBuf {
        self.root.join(&*urlencoding::encode(series_id))
    }

    pub fn has_series(&self, series_id: &str) -> bool {
        self.series_dir(series_id).is_dir()
    }

    /// All series ids known to this storage root, sorted.
    pub fn series(&self) -> StorageResult<Vec<String>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let encoded = name.to_string_lossy();
            match urlencoding::decode(&encoded) {
                Ok(decoded) => out.push(decoded.into_owned()),
                Err(_) => tracing::warn!("skipping undecodable series directory {:?}", name),
            }
        }
        out.sort();
        Ok(out)
    }

    /// Persist a sample. In-order samples (strictly ascending within their
    /// slot) take the fast append path; a sample at or before the slot's
    /// observed maximum takes the explicit rewrite path (last write wins on
    /// an equal timestamp).
    pub fn append(&mut self, series_id: &str, sample: &Sample) -> StorageResult<()> {
        let index = sample.timestamp.div_euclid(self.slot_width);
        self.ensure_active(series_id, index)?;

        let slot = self.active.get_mut(series_id).expect("active slot");
        if slot.is_empty() || sample.timestamp > slot.header.max_timestamp {
            slot.append(sample)?;
        } else {
            tracing::warn!(
                series = series_id,
                timestamp = sample.timestamp,
                slot = index,
                "out-of-order write, rewriting slot"
            );
            slot.insert(sample)?;
        }

        self.bytes_since_sync += RECORD_SIZE;
        self.maybe_sync(series_id)
    }

    /// Persist a batch of samples for one series.
    pub fn append_batch(&mut self, series_id: &str, samples: &[Sample]) -> StorageResult<()> {
        for sample in samples {
            self.append(series_id, sample)?;
        }
        Ok(())
    }

    /// Make the series' append target the slot at `index`, closing out any
    /// previously active slot.
    fn ensure_active(&mut self, series_id: &str, index: i64) -> StorageResult<()> {
        if let Some(slot) = self.active.get(series_id) {
            if slot.header.slot_index == index {
                return Ok(());
            }
        }
        if let Some(mut previous) = self.active.remove(series_id) {
            previous.sync()?;
        }

        let dir = self.series_dir(series_id);
        std::fs::create_dir_all(&dir)?;
        let path = slot_path(&dir, index);
        let slot = if path.exists() {
            Slot::open(&path)?
        } else {
            tracing::debug!(series = series_id, slot = index, "creating slot");
            Slot::create(&path, self.slot_width, index)?
        };
        self.active.insert(series_id.to_string(), slot);
        Ok(())
    }

    fn maybe_sync(&mut self, series_id: &str) -> StorageResult<()> {
        match self.sync_mode {
            SyncMode::EveryWrite => {
                if let Some(slot) = self.active.get_mut(series_id) {
                    slot.sync()?;
                }
                self.bytes_since_sync = 0;
            }
            SyncMode::Batched => {
                if self.bytes_since_sync >= self.sync_threshold {
                    self.flush()?;
                }
            }
            SyncMode::None => {}
        }
        Ok(())
    }

    /// Sync every active slot's records and header to disk.
    pub fn flush(&mut self) -> StorageResult<()> {
        for slot in self.active.values_mut() {
            slot.sync()?;
        }
        self.bytes_since_sync = 0;
        Ok(())
    }

    fn flush_series(&mut self, series_id: &str) -> StorageResult<()> {
        if let Some(slot) = self.active.get_mut(series_id) {
            slot.sync()?;
        }
        Ok(())
    }

    /// Slot indices present on disk for a series, sorted ascending.
    fn slot_indices(&self, series_id: &str) -> StorageResult<Vec<i64>> {
        let dir = self.series_dir(series_id);
        if !dir.is_dir() {
            return Err(StorageError::SeriesNotFound(series_id.to_string()));
        }
        let mut indices = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(index) = parse_slot_index(&name.to_string_lossy()) {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    /// Lazy ascending scan over `[range.start, range.end)`, transparently
    /// spanning slots.
    ///
    /// Items are `StorageResult<Sample>`: on corruption the scan yields all
    /// valid samples before the damage, then the error, then stops.
    pub fn scan(&mut self, series_id: &str, range: TimeRange) -> StorageResult<ScanIter> {
        self.flush_series(series_id)?;
        let indices = self.slot_indices(series_id)?;

        let paths = if range.is_empty() {
            VecDeque::new()
        } else {
            let first = range.start.div_euclid(self.slot_width);
            let last = (range.end - 1).div_euclid(self.slot_width);
            let dir = self.series_dir(series_id);
            indices
                .into_iter()
                .filter(|index| (first..=last).contains(index))
                .map(|index| slot_path(&dir, index))
                .collect()
        };

        Ok(ScanIter {
            paths,
            current: None,
            range,
            finished: false,
        })
    }

    /// Latest persisted sample with timestamp <= `timestamp`.
    pub fn last_at_or_before(
        &mut self,
        series_id: &str,
        timestamp: i64,
    ) -> StorageResult<Option<Sample>> {
        self.flush_series(series_id)?;
        let dir = self.series_dir(series_id);
        let limit = timestamp.div_euclid(self.slot_width);

        for index in self.slot_indices(series_id)?.into_iter().rev() {
            if index > limit {
                continue;
            }
            let slot = Slot::open(slot_path(&dir, index))?;
            if slot.is_empty() || slot.header.min_timestamp > timestamp {
                continue;
            }
            let mut found = None;
            for item in slot.records()? {
                let sample = item?;
                if sample.timestamp > timestamp {
                    break;
                }
                found = Some(sample);
            }
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Earliest persisted sample with timestamp >= `timestamp`.
    pub fn first_at_or_after(
        &mut self,
        series_id: &str,
        timestamp: i64,
    ) -> StorageResult<Option<Sample>> {
        self.flush_series(series_id)?;
        let dir = self.series_dir(series_id);
        let limit = timestamp.div_euclid(self.slot_width);

        for index in self.slot_indices(series_id)? {
            if index < limit {
                continue;
            }
            let slot = Slot::open(slot_path(&dir, index))?;
            if slot.is_empty() || slot.header.max_timestamp < timestamp {
                continue;
            }
            for item in slot.records()? {
                let sample = item?;
                if sample.timestamp >= timestamp {
                    return Ok(Some(sample));
                }
            }
        }
        Ok(None)
    }

    /// Delete every slot whose window lies entirely before `cutoff`.
    /// Returns the number of slots reclaimed.
    pub fn delete_before(&mut self, series_id: &str, cutoff: i64) -> StorageResult<usize> {
        let indices = self.slot_indices(series_id)?;
        let dir = self.series_dir(series_id);
        let mut removed = 0;

        for index in indices {
            // Fully elapsed: window end at or before the cutoff
            if (index + 1) * self.slot_width <= cutoff {
                if self
                    .active
                    .get(series_id)
                    .map(|slot| slot.header.slot_index == index)
                    .unwrap_or(false)
                {
                    self.active.remove(series_id);
                }
                std::fs::remove_file(slot_path(&dir, index))?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(series = series_id, removed, cutoff, "reclaimed slots");
        }
        Ok(removed)
    }

    /// Storage statistics across all series.
    pub fn stats(&mut self) -> StorageResult<StoreStats> {
        self.flush()?;
        let mut stats = StoreStats::default();

        for series_id in self.series()? {
            stats.series_count += 1;
            let dir = self.series_dir(&series_id);
            for index in self.slot_indices(&series_id)? {
                let path = slot_path(&dir, index);
                stats.slot_count += 1;
                stats.storage_size_bytes += std::fs::metadata(&path)?.len();
                stats.record_count += Slot::open(&path)?.header.record_count as u64;
            }
        }
        Ok(stats)
    }
}

fn slot_path(dir: &Path, index: i64) -> PathBuf {
    dir.join(format!("slot_{}.dat", index))
}

fn parse_slot_index(file_name: &str) -> Option<i64> {
    file_name
        .strip_prefix("slot_")?
        .strip_suffix(".dat")?
        .parse()
        .ok()
}

/// Ascending multi-slot scan, lazily opening one slot file at a time.
pub struct ScanIter {
    paths: VecDeque<PathBuf>,
    current: Option<SlotRecordIter>,
    range: TimeRange,
    finished: bool,
}

impl ScanIter {
    /// Drain into the valid samples plus the error that interrupted the
    /// scan, if any.
    pub fn collect_partial(self) -> (Vec<Sample>, Option<StorageError>) {
        let mut samples = Vec::new();
        for item in self {
            match item {
                Ok(sample) => samples.push(sample),
                Err(e) => return (samples, Some(e)),
            }
        }
        (samples, None)
    }
}

impl Iterator for ScanIter {
    type Item = StorageResult<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            if self.current.is_none() {
                let path = match self.paths.pop_front() {
                    Some(path) => path,
                    None => {
                        self.finished = true;
                        return None;
                    }
                };
                match Slot::open(&path).and_then(|slot| slot.records()) {
                    Ok(iter) => self.current = Some(iter),
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }

            match self.current.as_mut().unwrap().next() {
                Some(Ok(sample)) => {
                    if sample.timestamp >= self.range.end {
                        // Slots are visited in ascending order; nothing later
                        // can fall inside the range.
                        self.finished = true;
                        return None;
                    }
                    if sample.timestamp < self.range.start {
                        continue;
                    }
                    return Some(Ok(sample));
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.current = None;
                }
            }
        }
    }
}

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub series_count: usize,
    pub slot_count: usize,
    pub record_count: u64,
    pub storage_size_bytes: u64,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Series: {}, Slots: {}, Records: {}, Size: {:.2} KB",
            self.series_count,
            self.slot_count,
            self.record_count,
            self.storage_size_bytes as f64 / 1024.0
        )
    }
}
