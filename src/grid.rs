// =============================================================================
// Canonical Bucket Grid — temporal alignment of heterogeneous inputs
// =============================================================================
//
// Every series the engine produces is aligned to one canonical time grid.
// The grid is derived from the price bars: buckets where price data exists
// ARE the grid. Non-trading periods are simply absent — they are never
// fabricated or zero-filled, and gap lengths downstream (decay fill) are
// counted in grid steps, not calendar time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::BiasError;
use crate::types::PriceBar;

/// Seconds from the epoch back to the Monday preceding it (1969-12-29).
/// Aligns weekly buckets to ISO week starts.
const WEEK_EPOCH_OFFSET_SECS: i64 = -3 * 86_400;

/// The fixed time-granularity unit to which all observations are aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketGranularity {
    Hourly,
    Daily,
    Weekly,
}

impl Default for BucketGranularity {
    fn default() -> Self {
        Self::Daily
    }
}

impl std::fmt::Display for BucketGranularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hourly => write!(f, "hourly"),
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
        }
    }
}

impl BucketGranularity {
    /// Length of one bucket in seconds.
    fn step_seconds(self) -> i64 {
        match self {
            Self::Hourly => 3_600,
            Self::Daily => 86_400,
            Self::Weekly => 7 * 86_400,
        }
    }

    /// Truncate a timestamp to the start of its bucket (UTC).
    ///
    /// Weekly buckets start on Monday 00:00 UTC.
    pub fn truncate(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.step_seconds();
        let offset = match self {
            Self::Weekly => WEEK_EPOCH_OFFSET_SECS,
            _ => 0,
        };
        let start = (ts.timestamp() - offset).div_euclid(step) * step + offset;
        // Truncation stays within chrono's representable range for any
        // timestamp that was representable to begin with.
        DateTime::from_timestamp(start, 0).unwrap_or(ts)
    }
}

/// Ordered set of bucket keys for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketGrid {
    granularity: BucketGranularity,
    buckets: Vec<DateTime<Utc>>,
}

impl BucketGrid {
    /// Derive the canonical grid from an ordered price-bar window.
    ///
    /// # Errors
    /// - `Alignment` when two bars truncate into the same bucket (no series
    ///   may contain two observations for one bucket).
    /// - `Alignment` when bars are not in ascending timestamp order.
    pub fn from_price_bars(
        bars: &[PriceBar],
        granularity: BucketGranularity,
    ) -> Result<Self, BiasError> {
        let mut buckets = Vec::with_capacity(bars.len());

        for bar in bars {
            let key = granularity.truncate(bar.timestamp);
            match buckets.last() {
                Some(&prev) if key == prev => {
                    return Err(BiasError::Alignment {
                        component: "bucket grid",
                        detail: format!("two price bars fall into bucket {key}"),
                    });
                }
                Some(&prev) if key < prev => {
                    return Err(BiasError::Alignment {
                        component: "bucket grid",
                        detail: format!(
                            "price bars not in ascending order at {}",
                            bar.timestamp
                        ),
                    });
                }
                _ => buckets.push(key),
            }
        }

        trace!(
            granularity = %granularity,
            buckets = buckets.len(),
            "canonical grid derived"
        );

        Ok(Self {
            granularity,
            buckets,
        })
    }

    pub fn granularity(&self) -> BucketGranularity {
        self.granularity
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Bucket key at grid position `index`.
    pub fn bucket(&self, index: usize) -> Option<DateTime<Utc>> {
        self.buckets.get(index).copied()
    }

    /// All bucket keys, oldest first.
    pub fn buckets(&self) -> &[DateTime<Utc>] {
        &self.buckets
    }

    /// Grid position of the first bucket at or after `key`, if any.
    ///
    /// Used to map raw observations onto the grid: an observation falling
    /// into a non-trading gap counts toward the next trading bucket, never a
    /// past one.
    pub fn first_at_or_after(&self, key: DateTime<Utc>) -> Option<usize> {
        let idx = self.buckets.partition_point(|&b| b < key);
        (idx < self.buckets.len()).then_some(idx)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 30, 15).unwrap()
    }

    fn bar(t: DateTime<Utc>) -> PriceBar {
        PriceBar {
            timestamp: t,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 1_000.0,
        }
    }

    #[test]
    fn daily_truncation_drops_time_of_day() {
        let key = BucketGranularity::Daily.truncate(ts(2024, 3, 5, 14));
        assert_eq!(key, Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn hourly_truncation_drops_minutes() {
        let key = BucketGranularity::Hourly.truncate(ts(2024, 3, 5, 14));
        assert_eq!(key, Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap());
    }

    #[test]
    fn weekly_truncation_lands_on_monday() {
        // 2024-03-07 is a Thursday; its week starts Monday 2024-03-04.
        let key = BucketGranularity::Weekly.truncate(ts(2024, 3, 7, 9));
        assert_eq!(key, Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap());
        // A Monday truncates to itself.
        let monday = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        assert_eq!(BucketGranularity::Weekly.truncate(monday), monday);
    }

    #[test]
    fn grid_preserves_gaps() {
        // Friday, then Monday — the weekend is simply absent.
        let bars = vec![bar(ts(2024, 3, 1, 21)), bar(ts(2024, 3, 4, 21))];
        let grid = BucketGrid::from_price_bars(&bars, BucketGranularity::Daily).unwrap();
        assert_eq!(grid.len(), 2);
        assert_eq!(
            grid.bucket(1).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn duplicate_bucket_is_alignment_error() {
        let bars = vec![bar(ts(2024, 3, 1, 10)), bar(ts(2024, 3, 1, 16))];
        let err = BucketGrid::from_price_bars(&bars, BucketGranularity::Daily).unwrap_err();
        assert!(matches!(err, BiasError::Alignment { .. }));
    }

    #[test]
    fn unordered_bars_are_alignment_error() {
        let bars = vec![bar(ts(2024, 3, 4, 10)), bar(ts(2024, 3, 1, 10))];
        let err = BucketGrid::from_price_bars(&bars, BucketGranularity::Daily).unwrap_err();
        assert!(matches!(err, BiasError::Alignment { .. }));
    }

    #[test]
    fn first_at_or_after_maps_weekend_forward() {
        let bars = vec![bar(ts(2024, 3, 1, 21)), bar(ts(2024, 3, 4, 21))];
        let grid = BucketGrid::from_price_bars(&bars, BucketGranularity::Daily).unwrap();
        // Saturday truncates to 2024-03-02, which is not on the grid; the
        // next grid bucket is Monday.
        let saturday = BucketGranularity::Daily.truncate(ts(2024, 3, 2, 12));
        assert_eq!(grid.first_at_or_after(saturday), Some(1));
        // After the last bucket -> None.
        let later = BucketGranularity::Daily.truncate(ts(2024, 3, 8, 12));
        assert_eq!(grid.first_at_or_after(later), None);
    }
}
