//! Slot file format
//!
//! A slot is the durable unit for one series and one fixed-width time
//! window: all samples with `floor(timestamp / slot_width)` equal to the
//! slot's index live in the same file.
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HEADER (64 bytes)                       │
//! │   magic: [u8; 4] = "SLDB"               │
//! │   version: u16                          │
//! │   record_count: u32                     │
//! │   slot_width: i64                       │
//! │   slot_index: i64                       │
//! │   min_timestamp: i64                    │
//! │   max_timestamp: i64                    │
//! │   reserved: [u8; 18]                    │
//! │   checksum: u32                         │
//! ├─────────────────────────────────────────┤
//! │ RECORDS (record_count x 17 bytes)       │
//! │   timestamp: i64                        │
//! │   value: f64                            │
//! │   quality: u8                           │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Records are fixed-size and stored in strictly ascending timestamp order,
//! so the file is stride-addressable and append is a single write at the
//! end. Reads validate the header checksum and each record's membership in
//! the slot window; violations surface as `Corruption` with all records
//! before the violation still readable.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Quality, Sample, TimeRange};

/// Magic bytes identifying a slot file
const SLOT_MAGIC: [u8; 4] = *b"SLDB";

/// Current slot format version
const SLOT_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 64;

/// Fixed record size: timestamp (8) + value (8) + quality (1)
pub const RECORD_SIZE: usize = 17;

/// Slot file header
#[derive(Debug, Clone)]
pub struct SlotHeader {
    /// Format version
    pub version: u16,
    /// Number of records in the slot
    pub record_count: u32,
    /// Width of the slot's time window in milliseconds
    pub slot_width: i64,
    /// Window index: `floor(timestamp / slot_width)` of every record
    pub slot_index: i64,
    /// Minimum timestamp observed (i64::MAX while empty)
    pub min_timestamp: i64,
    /// Maximum timestamp observed (i64::MIN while empty)
    pub max_timestamp: i64,
}

impl SlotHeader {
    pub fn new(slot_width: i64, slot_index: i64) -> Self {
        Self {
            version: SLOT_VERSION,
            record_count: 0,
            slot_width,
            slot_index,
            min_timestamp: i64::MAX,
            max_timestamp: i64::MIN,
        }
    }

    /// The time window this slot covers, as a half-open range.
    pub fn window(&self) -> TimeRange {
        let start = self.slot_index * self.slot_width;
        TimeRange::new(start, start + self.slot_width)
    }

    /// Serialize to bytes, computing the checksum.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..4].copy_from_slice(&SLOT_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..10].copy_from_slice(&self.record_count.to_le_bytes());
        buf[10..18].copy_from_slice(&self.slot_width.to_le_bytes());
        buf[18..26].copy_from_slice(&self.slot_index.to_le_bytes());
        buf[26..34].copy_from_slice(&self.min_timestamp.to_le_bytes());
        buf[34..42].copy_from_slice(&self.max_timestamp.to_le_bytes());
        // bytes 42-59 reserved

        let checksum = crc32fast::hash(&buf[0..60]);
        buf[60..64].copy_from_slice(&checksum.to_le_bytes());

        buf
    }

    /// Parse and validate a header.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> StorageResult<Self> {
        let stored_checksum = u32::from_le_bytes([buf[60], buf[61], buf[62], buf[63]]);
        let computed_checksum = crc32fast::hash(&buf[0..60]);
        if stored_checksum != computed_checksum {
            return Err(StorageError::Corruption(format!(
                "slot header checksum mismatch: stored={}, computed={}",
                stored_checksum, computed_checksum
            )));
        }

        if buf[0..4] != SLOT_MAGIC {
            return Err(StorageError::InvalidSlot(format!(
                "bad magic: {:?}",
                &buf[0..4]
            )));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version > SLOT_VERSION {
            return Err(StorageError::InvalidSlot(format!(
                "unsupported version: {}",
                version
            )));
        }

        let record_count = u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]);
        let slot_width = i64::from_le_bytes(buf[10..18].try_into().unwrap());
        let slot_index = i64::from_le_bytes(buf[18..26].try_into().unwrap());
        let min_timestamp = i64::from_le_bytes(buf[26..34].try_into().unwrap());
        let max_timestamp = i64::from_le_bytes(buf[34..42].try_into().unwrap());

        if slot_width <= 0 {
            return Err(StorageError::InvalidSlot(format!(
                "non-positive slot width: {}",
                slot_width
            )));
        }

        let header = Self {
            version,
            record_count,
            slot_width,
            slot_index,
            min_timestamp,
            max_timestamp,
        };

        if record_count > 0 {
            let window = header.window();
            if header.min_timestamp > header.max_timestamp
                || !window.contains(header.min_timestamp)
                || !window.contains(header.max_timestamp)
            {
                return Err(StorageError::Corruption(format!(
                    "slot {} bounds [{}, {}] outside window [{}, {})",
                    slot_index, header.min_timestamp, header.max_timestamp, window.start, window.end
                )));
            }
        }

        Ok(header)
    }
}

fn encode_record(sample: &Sample) -> [u8; RECORD_SIZE] {
    let mut buf = [0u8; RECORD_SIZE];
    buf[0..8].copy_from_slice(&sample.timestamp.to_le_bytes());
    buf[8..16].copy_from_slice(&sample.value.to_le_bytes());
    buf[16] = sample.quality.into();
    buf
}

fn decode_record(buf: &[u8; RECORD_SIZE]) -> StorageResult<Sample> {
    let timestamp = i64::from_le_bytes(buf[0..8].try_into().unwrap());
    let value = f64::from_le_bytes(buf[8..16].try_into().unwrap());
    let quality = Quality::try_from(buf[16])
        .map_err(|b| StorageError::Corruption(format!("invalid quality byte: {}", b)))?;
    Ok(Sample {
        timestamp,
        value,
        quality,
    })
}

/// One slot file: header plus its append handle.
///
/// Appends update the in-memory header immediately; the on-disk header is
/// rewritten on `sync` (and by the store according to its sync mode), so a
/// crash can leave acknowledged-but-unsynced records as a trailing tail that
/// `open` discards with a warning.
pub struct Slot {
    pub path: PathBuf,
    pub header: SlotHeader,
    /// Lazily opened read-write handle for the append path
    file: Option<File>,
    /// Header on disk is stale
    dirty: bool,
}

impl Slot {
    /// Create a new slot file with an empty header.
    pub fn create(path: impl AsRef<Path>, slot_width: i64, slot_index: i64) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let header = SlotHeader::new(slot_width, slot_index);
        let mut file = File::create(&path)?;
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;

        Ok(Self {
            path,
            header,
            file: None,
            dirty: false,
        })
    }

    /// Open an existing slot file, validating its header and structure.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;

        let mut header_buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_buf)?;
        let header = SlotHeader::from_bytes(&header_buf)?;

        let expected_len = HEADER_SIZE as u64 + header.record_count as u64 * RECORD_SIZE as u64;
        let actual_len = file.metadata()?.len();
        if actual_len < expected_len {
            return Err(StorageError::Corruption(format!(
                "slot {} truncated: {} bytes, header claims {}",
                header.slot_index, actual_len, expected_len
            )));
        }
        if actual_len > expected_len {
            // Tail beyond the last synced header: records from an append the
            // durability policy never acknowledged. Recoverable, not corrupt.
            tracing::warn!(
                slot = header.slot_index,
                tail_bytes = actual_len - expected_len,
                "discarding unsynced tail in {:?}",
                path
            );
        }

        Ok(Self {
            path,
            header,
            file: None,
            dirty: false,
        })
    }

    fn writer(&mut self) -> StorageResult<&mut File> {
        if self.file.is_none() {
            self.file = Some(OpenOptions::new().read(true).write(true).open(&self.path)?);
        }
        Ok(self.file.as_mut().unwrap())
    }

    /// Append a record. The fast path: `sample.timestamp` must lie inside the
    /// slot window and be strictly greater than every stored timestamp.
    pub fn append(&mut self, sample: &Sample) -> StorageResult<()> {
        if !self.header.window().contains(sample.timestamp) {
            return Err(StorageError::InvalidSlot(format!(
                "timestamp {} outside slot {} window",
                sample.timestamp, self.header.slot_index
            )));
        }
        if self.header.record_count > 0 && sample.timestamp <= self.header.max_timestamp {
            return Err(StorageError::InvalidSlot(format!(
                "non-ascending append: {} <= {}",
                sample.timestamp, self.header.max_timestamp
            )));
        }

        let offset =
            HEADER_SIZE as u64 + self.header.record_count as u64 * RECORD_SIZE as u64;
        let record = encode_record(sample);
        let file = self.writer()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&record)?;

        self.header.record_count += 1;
        self.header.min_timestamp = self.header.min_timestamp.min(sample.timestamp);
        self.header.max_timestamp = self.header.max_timestamp.max(sample.timestamp);
        self.dirty = true;

        Ok(())
    }

    /// Insert a sample out of order, rewriting the slot file.
    ///
    /// This is the explicit late-write path: the slot's records are read,
    /// merged in timestamp order (last write wins on an equal timestamp),
    /// and the file is atomically replaced.
    pub fn insert(&mut self, sample: &Sample) -> StorageResult<()> {
        if !self.header.window().contains(sample.timestamp) {
            return Err(StorageError::InvalidSlot(format!(
                "timestamp {} outside slot {} window",
                sample.timestamp, self.header.slot_index
            )));
        }

        let mut records = self.read_all()?;
        match records.binary_search_by_key(&sample.timestamp, |s| s.timestamp) {
            Ok(pos) => records[pos] = *sample,
            Err(pos) => records.insert(pos, *sample),
        }

        let mut header = SlotHeader::new(self.header.slot_width, self.header.slot_index);
        header.record_count = records.len() as u32;
        header.min_timestamp = records.first().map(|s| s.timestamp).unwrap_or(i64::MAX);
        header.max_timestamp = records.last().map(|s| s.timestamp).unwrap_or(i64::MIN);

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&header.to_bytes())?;
            for record in &records {
                tmp.write_all(&encode_record(record))?;
            }
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        // The old append handle points at the replaced file.
        self.file = None;
        self.header = header;
        self.dirty = false;

        Ok(())
    }

    /// Rewrite the on-disk header and fsync.
    pub fn sync(&mut self) -> StorageResult<()> {
        if self.dirty {
            let header = self.header.to_bytes();
            let file = self.writer()?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&header)?;
            self.dirty = false;
        }
        if let Some(file) = self.file.as_ref() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Lazy iteration over all records in ascending order.
    ///
    /// Each item is a `StorageResult<Sample>`: on corruption the iterator
    /// yields every valid record before the damage, then the error, then
    /// stops.
    pub fn records(&self) -> StorageResult<SlotRecordIter> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        Ok(SlotRecordIter {
            reader,
            remaining: self.header.record_count,
            window: self.header.window(),
            prev_timestamp: None,
            finished: false,
        })
    }

    /// Eagerly read all records, failing on the first corruption.
    pub fn read_all(&self) -> StorageResult<Vec<Sample>> {
        self.records()?.collect()
    }

    pub fn is_empty(&self) -> bool {
        self.header.record_count == 0
    }
}

/// Iterator over a slot's records, validating each against the slot window
/// and the ascending-order invariant.
pub struct SlotRecordIter {
    reader: BufReader<File>,
    remaining: u32,
    window: TimeRange,
    prev_timestamp: Option<i64>,
    finished: bool,
}

impl Iterator for SlotRecordIter {
    type Item = StorageResult<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.remaining == 0 {
            return None;
        }

        let mut buf = [0u8; RECORD_SIZE];
        if let Err(e) = self.reader.read_exact(&mut buf) {
            self.finished = true;
            // Header promised more records than the file holds.
            return Some(Err(if e.kind() == std::io::ErrorKind::UnexpectedEof {
                StorageError::Corruption("slot file ends before last record".into())
            } else {
                e.into()
            }));
        }

        let sample = match decode_record(&buf) {
            Ok(sample) => sample,
            Err(e) => {
                self.finished = true;
                return Some(Err(e));
            }
        };

        if !self.window.contains(sample.timestamp) {
            self.finished = true;
            return Some(Err(StorageError::Corruption(format!(
                "record timestamp {} outside slot window [{}, {})",
                sample.timestamp, self.window.start, self.window.end
            ))));
        }
        if let Some(prev) = self.prev_timestamp {
            if sample.timestamp <= prev {
                self.finished = true;
                return Some(Err(StorageError::Corruption(format!(
                    "record order violation: {} after {}",
                    sample.timestamp, prev
                ))));
            }
        }

        self.prev_timestamp = Some(sample.timestamp);
        self.remaining -= 1;
        Some(Ok(sample))
    }
}
