//! slotdb recording engine
//!
//! This module provides the core time-series recording functionality:
//!
//! - **types**: Core data structures (Sample, Quality, InterpolationMode, TimeRange)
//! - **series**: In-memory ordered series with neighbor lookups
//! - **interpolate**: Point-query evaluation between stored samples
//! - **reduce**: Windowed aggregation strategies
//! - **slot**: Slot file format (checksummed header + fixed-size records)
//! - **store**: Durable slot store spanning series and windows
//! - **recorder**: Orchestration of buffers, store, queries, and reduction
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Sample → Recorder → SlotStore (append) + OrderedSeries (buffer)
//!
//! Read Path:
//!   Query → merge(buffer, slot scan) → Interpolation / Reduction → Samples
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use slotdb::storage::{InterpolationMode, Recorder, RecorderConfig, Sample};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut recorder = Recorder::open(RecorderConfig::new("./data"))?;
//!
//!     recorder.create_series("outdoor_temp", InterpolationMode::Linear)?;
//!     recorder.record("outdoor_temp", Sample::now(21.5))?;
//!
//!     let data = recorder.query("outdoor_temp", 0, i64::MAX)?;
//!     println!("{} samples", data.samples.len());
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod interpolate;
pub mod recorder;
pub mod reduce;
pub mod series;
pub mod slot;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use recorder::{RangeData, Recorder, RecorderConfig};
pub use reduce::{reduce_range, window_ends, ReductionKind};
pub use series::OrderedSeries;
pub use slot::{Slot, SlotHeader};
pub use store::{ScanIter, SlotStore, StoreStats, SyncMode};
pub use types::{InterpolationMode, Quality, Sample, TimeRange};
