// =============================================================================
// Market Feature Extractor
// =============================================================================
//
// Turns an ordered price-bar window into one `FeatureVector` per bucket from
// `lookback` onward:
//
//   trend     — window-scaled OLS slope of log close, tanh-bounded
//   range_pct — (high - low) / close for the current bar, missing when the
//               close is unusable
//   momentum  — short-window rate of change, tanh-bounded
//
// Missing bars (non-trading periods) are skipped, never zero-filled; no
// trading bucket is ever fabricated. Degenerate trend/momentum windows are
// neutralized to 0.0 instead of erroring, so one malformed bar cannot poison
// an otherwise valid window.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::error::BiasError;
use crate::features::momentum::rate_of_change;
use crate::features::slope::log_close_slope;
use crate::grid::BucketGrid;
use crate::types::{FeatureVector, PriceBar};

/// Total fitted log-return over the lookback that saturates the trend.
const TREND_SCALE: f64 = 0.05;

/// Rate of change over the momentum window that saturates the momentum.
const MOMENTUM_SCALE: f64 = 0.05;

/// Rolling state sufficient to accept one new bar and produce one feature
/// vector in bounded time.
///
/// Owned exclusively by one pipeline instance; independent instruments run
/// independent states.
#[derive(Debug, Clone)]
pub struct FeatureState {
    lookback: usize,
    momentum_window: usize,
    closes: VecDeque<f64>,
}

impl FeatureState {
    pub fn new(lookback: usize, momentum_window: usize) -> Self {
        Self {
            lookback,
            momentum_window,
            closes: VecDeque::with_capacity(lookback + 1),
        }
    }

    /// Accept the next bar (already mapped to `bucket`) and produce its
    /// feature vector once `lookback` bars have accumulated.
    pub fn push(&mut self, bar: &PriceBar, bucket: DateTime<Utc>) -> Option<FeatureVector> {
        self.closes.push_back(bar.close);
        while self.closes.len() > self.lookback {
            self.closes.pop_front();
        }
        if self.closes.len() < self.lookback {
            return None;
        }

        let window: &[f64] = self.closes.make_contiguous();

        // Degenerate windows (non-positive closes, zero variance) read as
        // neutral rather than failing the whole window.
        let trend_raw = log_close_slope(window).unwrap_or(0.0);
        let momentum_raw = rate_of_change(window, self.momentum_window).unwrap_or(0.0);

        let range_pct = intrabar_range(bar);
        if range_pct.is_none() {
            trace!(bucket = %bucket, close = bar.close, "range_pct unusable, propagating missing");
        }

        Some(FeatureVector {
            bucket,
            trend: (trend_raw / TREND_SCALE).tanh(),
            range_pct,
            momentum: (momentum_raw / MOMENTUM_SCALE).tanh(),
        })
    }
}

/// `(high - low) / close`, missing when the close is zero or non-finite.
fn intrabar_range(bar: &PriceBar) -> Option<f64> {
    if !(bar.close.is_finite() && bar.high.is_finite() && bar.low.is_finite()) {
        return None;
    }
    if bar.close == 0.0 {
        return None;
    }
    let range = (bar.high - bar.low) / bar.close;
    range.is_finite().then(|| range.max(0.0))
}

/// Extract one `FeatureVector` per bucket from `lookback` onward.
///
/// # Errors
/// - `InsufficientData` when fewer than `lookback` bars are supplied.
/// - `Alignment` when bars are unordered or two bars share a bucket.
pub fn extract(bars: &[PriceBar], config: &EngineConfig) -> Result<Vec<FeatureVector>, BiasError> {
    if bars.len() < config.lookback {
        return Err(BiasError::InsufficientData {
            component: "feature extractor",
            required: config.lookback,
            supplied: bars.len(),
        });
    }

    let grid = BucketGrid::from_price_bars(bars, config.bucket_granularity)?;
    let momentum_window = config.effective_momentum_window();

    let mut state = FeatureState::new(config.lookback, momentum_window);
    let mut features = Vec::with_capacity(bars.len() - config.lookback + 1);

    for (bar, &bucket) in bars.iter().zip(grid.buckets()) {
        if let Some(fv) = state.push(bar, bucket) {
            features.push(fv);
        }
    }

    debug!(
        bars = bars.len(),
        features = features.len(),
        lookback = config.lookback,
        momentum_window,
        "features extracted"
    );

    Ok(features)
}
