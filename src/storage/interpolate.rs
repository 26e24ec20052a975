//! Interpolation engine
//!
//! Pure, stateless evaluation of "what is the value at time T" given the
//! neighboring stored samples and an [`InterpolationMode`]. Absence is a
//! normal answer (`None`), not an error.

use crate::storage::types::{InterpolationMode, Sample};

/// Evaluate a point query at `timestamp` from its stored neighbors.
///
/// `prev` is the latest stored sample with `timestamp <= T` and `next` the
/// earliest with `timestamp >= T`; a sample stored exactly at `T` appears as
/// both.
///
/// - `None`: the stored sample only if one exists exactly at `T`.
/// - `Steps`: `prev`'s value and quality restamped at `T`; absent before the
///   first sample.
/// - `Linear`: linear interpolation between `prev` and `next`; the stored
///   sample unchanged when `T` hits one exactly; absent outside the stored
///   range. Quality is `Good` only if both neighbors are `Good`.
pub fn value_at(
    prev: Option<Sample>,
    next: Option<Sample>,
    timestamp: i64,
    mode: InterpolationMode,
) -> Option<Sample> {
    match mode {
        InterpolationMode::None => prev.filter(|p| p.timestamp == timestamp),
        InterpolationMode::Steps => prev.map(|p| Sample {
            timestamp,
            value: p.value,
            quality: p.quality,
        }),
        InterpolationMode::Linear => {
            let (p, n) = (prev?, next?);
            // Exact hit on a stored sample; also covers the zero-width
            // interval, skipping the division below.
            if p.timestamp == timestamp {
                return Some(p);
            }
            if n.timestamp == timestamp {
                return Some(n);
            }
            let fraction = (timestamp - p.timestamp) as f64 / (n.timestamp - p.timestamp) as f64;
            Some(Sample {
                timestamp,
                value: p.value + (n.value - p.value) * fraction,
                quality: p.quality.and(n.quality),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::Quality;

    fn good(ts: i64, v: f64) -> Sample {
        Sample::new(ts, v)
    }

    #[test]
    fn test_none_exact_hit_only() {
        let stored = good(1000, 5.0);
        assert_eq!(
            value_at(Some(stored), Some(stored), 1000, InterpolationMode::None),
            Some(stored)
        );
        // prev exists but is older than T
        assert_eq!(
            value_at(
                Some(good(900, 5.0)),
                Some(good(1100, 6.0)),
                1000,
                InterpolationMode::None
            ),
            None
        );
        assert_eq!(value_at(None, None, 1000, InterpolationMode::None), None);
    }

    #[test]
    fn test_steps_holds_previous() {
        let result = value_at(
            Some(good(0, 10.0)),
            Some(good(10, 20.0)),
            5,
            InterpolationMode::Steps,
        )
        .unwrap();
        assert_eq!(result.timestamp, 5);
        assert_eq!(result.value, 10.0);
        assert_eq!(result.quality, Quality::Good);
    }

    #[test]
    fn test_steps_absent_before_first() {
        assert_eq!(
            value_at(None, Some(good(10, 20.0)), 5, InterpolationMode::Steps),
            None
        );
    }

    #[test]
    fn test_steps_propagates_bad_quality() {
        let result = value_at(
            Some(Sample::bad(0, 0.0)),
            None,
            5,
            InterpolationMode::Steps,
        )
        .unwrap();
        assert_eq!(result.quality, Quality::Bad);
    }

    #[test]
    fn test_linear_midpoint() {
        let result = value_at(
            Some(good(0, 10.0)),
            Some(good(10, 20.0)),
            5,
            InterpolationMode::Linear,
        )
        .unwrap();
        assert_eq!(result.timestamp, 5);
        assert_eq!(result.value, 15.0);
        assert_eq!(result.quality, Quality::Good);
    }

    #[test]
    fn test_linear_exact_hit_returns_stored() {
        let stored = good(10, 20.0);
        // Neighbors on both sides; exact hit must return the stored sample
        // unchanged.
        let result = value_at(Some(stored), Some(stored), 10, InterpolationMode::Linear);
        assert_eq!(result, Some(stored));
    }

    #[test]
    fn test_linear_outside_range_is_absent() {
        // Before first sample
        assert_eq!(
            value_at(None, Some(good(10, 20.0)), 5, InterpolationMode::Linear),
            None
        );
        // After last sample
        assert_eq!(
            value_at(Some(good(10, 20.0)), None, 15, InterpolationMode::Linear),
            None
        );
    }

    #[test]
    fn test_linear_bad_neighbor_taints_quality() {
        let result = value_at(
            Some(Sample::bad(0, 10.0)),
            Some(good(10, 20.0)),
            5,
            InterpolationMode::Linear,
        )
        .unwrap();
        assert_eq!(result.quality, Quality::Bad);
    }

    #[test]
    fn test_linear_asymmetric_fraction() {
        // 1/4 of the way from 0 to 100
        let result = value_at(
            Some(good(0, 0.0)),
            Some(good(100, 8.0)),
            25,
            InterpolationMode::Linear,
        )
        .unwrap();
        assert_eq!(result.value, 2.0);
    }
}
