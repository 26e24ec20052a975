//! # slotdb
//!
//! Slotted time-series recording engine: durable storage of timestamped
//! measurement samples, point queries via interpolation, and windowed
//! reduction into derived series.
//!
//! ## Features
//!
//! - **Slotted storage**: one checksummed, append-only file per series and
//!   fixed time window, for fast sequential writes and range scans
//! - **Interpolation**: none / steps / linear point queries with quality
//!   propagation
//! - **Reduction**: average, min, max, count, and integral over aligned
//!   windows, with explicit placeholders for empty windows
//! - **Explicit durability**: per-append, batched, or OS-managed fsync
//!
//! ## Concurrency
//!
//! The engine has no internal locking: one recorder owns a storage root,
//! and concurrent access to it must be serialized by the caller. This keeps
//! the hot append path free of contention for the common single-producer
//! case.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slotdb::storage::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut recorder = Recorder::open(RecorderConfig::new("./data"))?;
//!
//!     recorder.create_series("outdoor_temp", InterpolationMode::Linear)?;
//!     recorder.record("outdoor_temp", Sample::now(21.5))?;
//!
//!     // Interpolated point query
//!     let now = chrono::Utc::now().timestamp_millis();
//!     if let Some(sample) = recorder.value_at("outdoor_temp", now)? {
//!         println!("{} ({})", sample.value, sample.quality);
//!     }
//!
//!     // Hourly averages for the last day
//!     let range = TimeRange::last_days(1);
//!     recorder.reduce(
//!         "outdoor_temp",
//!         range.start,
//!         range.end,
//!         3_600_000,
//!         ReductionKind::Average,
//!         "outdoor_temp_hourly",
//!     )?;
//!
//!     recorder.flush()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    InterpolationMode, OrderedSeries, Quality, RangeData, Recorder, RecorderConfig, ReductionKind,
    Sample, SlotStore, StorageError, StorageResult, StoreStats, SyncMode, TimeRange,
};

pub use config::{generate_default_config, parse_duration_ms, Config};
