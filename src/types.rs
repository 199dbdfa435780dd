// =============================================================================
// Shared types used across the prevailing-bias engine
// =============================================================================
//
// Every per-bucket type carries its bucket timestamp so that a series is an
// ordered `Vec<T>` keyed by bucket. All types are immutable snapshots: they
// are created fresh per pipeline invocation and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single scalar reading from any source, keyed by its raw timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// One OHLCV bar per trading period, oldest first.
///
/// Gaps between bars (non-trading periods) are permitted and are never
/// treated as zero-valued bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// The sentiment source a raw item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    News,
    Social,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::News => write!(f, "news"),
            Self::Social => write!(f, "social"),
        }
    }
}

/// A single already-classified sentiment reading.
///
/// `polarity` is in [-1, 1] (bearish to bullish), `confidence` in [0, 1].
/// Multiple items may share a bucket; order within a bucket is irrelevant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentItem {
    pub timestamp: DateTime<Utc>,
    pub polarity: f64,
    pub confidence: f64,
    pub channel: Channel,
}

/// Normalized technical features for one bucket where price data exists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub bucket: DateTime<Utc>,

    /// Bounded slope of the trailing linear fit of log close.
    pub trend: f64,

    /// Realized intrabar volatility `(high - low) / close`.
    ///
    /// `None` when the bar's close is zero or non-finite — missing is
    /// propagated, never fabricated.
    pub range_pct: Option<f64>,

    /// Bounded rate of change over the short momentum window.
    pub momentum: f64,
}

/// Decay-weighted aggregate sentiment for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentAggregate {
    pub bucket: DateTime<Utc>,
    pub news_score: f64,
    pub social_score: f64,

    /// Fraction of the news score backed by real (non-imputed) items, [0, 1].
    pub news_coverage: f64,

    /// Fraction of the social score backed by real (non-imputed) items, [0, 1].
    pub social_coverage: f64,
}

/// Composite bias for one bucket, with its channel decomposition.
///
/// The components sum to `value` under the coverage-renormalized weights;
/// `value` stays within [-1, 1] for every valid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasScore {
    pub bucket: DateTime<Utc>,
    pub value: f64,
    pub price_component: f64,
    pub news_component: f64,
    pub social_component: f64,
}

/// Reversal-risk reading for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FragilityIndex {
    pub bucket: DateTime<Utc>,

    /// Combined reversal-risk scalar in [0, 1].
    pub fragility: f64,

    /// Consecutive buckets since the composite bias last changed sign.
    pub run_length: u32,

    /// Normalized spread among the three bias components, [0, 1].
    pub divergence: f64,
}
