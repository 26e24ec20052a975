//! Reduction engine
//!
//! Windowed aggregation of samples into derived series. Strategies form a
//! closed set dispatched by [`ReductionKind`]; each is a pure function from
//! the samples inside one window to the sample(s) summarizing it, and all
//! obey the same empty-window contract: no input produces exactly one `Bad`
//! placeholder at the window end, so reduced series have one sample per
//! window, never gaps.
//!
//! Windows are aligned to multiples of the window width and cover the
//! half-open interval `(end - width, end]`; a sample sitting exactly on the
//! aligned start of the requested range therefore belongs to the preceding
//! window.

use serde::{Deserialize, Serialize};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::series::OrderedSeries;
use crate::storage::types::{Sample, TimeRange};

/// Aggregation strategy for one reduction window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReductionKind {
    /// Arithmetic mean, computed as a running mean to bound floating-point
    /// error over long windows.
    Average,
    /// Smallest value in the window.
    Min,
    /// Largest value in the window.
    Max,
    /// Number of samples in the window.
    Count,
    /// Trapezoidal integral over the window, in value-seconds.
    Integral,
}

impl ReductionKind {
    /// All strategies, for iteration.
    pub fn all() -> &'static [ReductionKind] {
        &[
            ReductionKind::Average,
            ReductionKind::Min,
            ReductionKind::Max,
            ReductionKind::Count,
            ReductionKind::Integral,
        ]
    }

    /// Reduce the samples of one window, `samples` being the ordered contents
    /// of `(window_end - width, window_end]`.
    ///
    /// An empty window yields exactly one `(window_end, 0.0, Bad)`
    /// placeholder: "no data", not a zero reading.
    pub fn reduce(&self, samples: &[Sample], window_end: i64) -> Vec<Sample> {
        if samples.is_empty() {
            return vec![Sample::bad(window_end, 0.0)];
        }

        let value = match self {
            ReductionKind::Average => {
                let mut avg = 0.0;
                for (i, sample) in samples.iter().enumerate() {
                    avg += (sample.value - avg) / (i + 1) as f64;
                }
                avg
            }
            ReductionKind::Min => samples.iter().map(|s| s.value).fold(f64::INFINITY, f64::min),
            ReductionKind::Max => samples
                .iter()
                .map(|s| s.value)
                .fold(f64::NEG_INFINITY, f64::max),
            ReductionKind::Count => samples.len() as f64,
            ReductionKind::Integral => samples
                .windows(2)
                .map(|pair| {
                    let dt_secs = (pair[1].timestamp - pair[0].timestamp) as f64 / 1000.0;
                    (pair[0].value + pair[1].value) / 2.0 * dt_secs
                })
                .sum(),
        };

        vec![Sample::new(window_end, value)]
    }
}

impl std::str::FromStr for ReductionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "average" | "avg" | "mean" => Ok(ReductionKind::Average),
            "min" => Ok(ReductionKind::Min),
            "max" => Ok(ReductionKind::Max),
            "count" => Ok(ReductionKind::Count),
            "integral" => Ok(ReductionKind::Integral),
            other => Err(format!("unknown reduction strategy: {}", other)),
        }
    }
}

impl std::fmt::Display for ReductionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReductionKind::Average => write!(f, "average"),
            ReductionKind::Min => write!(f, "min"),
            ReductionKind::Max => write!(f, "max"),
            ReductionKind::Count => write!(f, "count"),
            ReductionKind::Integral => write!(f, "integral"),
        }
    }
}

/// End timestamps of the aligned windows covering `range`, ascending.
///
/// Window k covers `(k*width, (k+1)*width]`; the enumeration spans every
/// window containing at least one point of `[range.start, range.end)`.
pub fn window_ends(range: TimeRange, width: i64) -> StorageResult<Vec<i64>> {
    if width <= 0 {
        return Err(StorageError::InvalidWindow(width));
    }
    if range.is_empty() {
        return Ok(Vec::new());
    }
    let first = range.start.div_euclid(width);
    let last = (range.end - 1).div_euclid(width);
    Ok((first..=last).map(|k| (k + 1) * width).collect())
}

/// The window covering `(end - width, end]` as a half-open scan range.
/// Timestamps are integral milliseconds, so `(a, b]` is `[a + 1, b + 1)`.
pub fn window_scan_range(window_end: i64, width: i64) -> TimeRange {
    TimeRange::new(window_end - width + 1, window_end + 1)
}

/// Reduce an in-memory series over `range` into consecutive fixed-width
/// windows, one invocation of `kind` per window in ascending order.
///
/// The output has exactly one sample per window with strictly increasing
/// timestamps equal to each window's end.
pub fn reduce_range(
    series: &OrderedSeries,
    range: TimeRange,
    width: i64,
    kind: ReductionKind,
) -> StorageResult<Vec<Sample>> {
    let mut out = Vec::new();
    for end in window_ends(range, width)? {
        let input: Vec<Sample> = series.range(window_scan_range(end, width)).collect();
        out.extend(kind.reduce(&input, end));
    }
    Ok(out)
}
