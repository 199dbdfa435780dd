// =============================================================================
// Bias Pipeline — batch and incremental orchestration
// =============================================================================
//
// Wires the four components into one pass over a supplied window:
//
//   price bars ── features ──┐
//                            ├── fusion ── fragility
//   raw items ── sentiment ──┘
//
// The canonical grid is derived from the price bars (buckets where price
// data exists ARE the grid). The batch path and the incremental path fold
// the same per-component rolling states, so the two modes cannot drift
// apart. A pipeline instance owns its state exclusively; independent
// instruments run independent instances.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::BiasError;
use crate::features::{self, FeatureState};
use crate::fragility::{self, FragilityState};
use crate::fusion::{self, FusionState};
use crate::grid::BucketGrid;
use crate::sentiment::aggregator::{self, usable_pair, ChannelState};
use crate::types::{
    BiasScore, Channel, FeatureVector, FragilityIndex, PriceBar, SentimentAggregate,
    SentimentItem,
};

/// The four aligned output series for one window, each ordered by bucket
/// timestamp and ready for the visualization collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasReport {
    pub features: Vec<FeatureVector>,
    pub sentiment: Vec<SentimentAggregate>,
    pub bias: Vec<BiasScore>,
    pub fragility: Vec<FragilityIndex>,
}

/// Batch pipeline over a fixed historical window.
#[derive(Debug, Clone)]
pub struct BiasPipeline {
    config: EngineConfig,
}

impl BiasPipeline {
    /// Validate the configuration and build a pipeline.
    pub fn new(config: EngineConfig) -> Result<Self, BiasError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the full pipeline over one window.
    ///
    /// Derived series cover exactly the bucket range their inputs support:
    /// sentiment spans the whole grid, features start at `lookback`, bias at
    /// `lookback + warmup - 1`, fragility after its settling window on top.
    pub fn run(
        &self,
        bars: &[PriceBar],
        news_items: &[SentimentItem],
        social_items: &[SentimentItem],
    ) -> Result<BiasReport, BiasError> {
        let grid = BucketGrid::from_price_bars(bars, self.config.bucket_granularity)?;

        let features = features::extract(bars, &self.config)?;
        let sentiment = aggregator::aggregate(news_items, social_items, &grid, &self.config)?;

        // Features exist from `lookback` onward; fuse over that range.
        let offset = grid.len() - features.len();
        let bias = fusion::fuse(&features, &sentiment[offset..], &self.config)?;

        // Fragility consumes the bias trajectory plus the realized ranges of
        // the same buckets.
        let bias_offset = features.len() - bias.len();
        let ranges: Vec<Option<f64>> = features[bias_offset..]
            .iter()
            .map(|fv| fv.range_pct)
            .collect();
        let fragility = fragility::estimate(
            &bias,
            &ranges,
            &self.config.fragility,
            self.config.effective_vol_window(),
        )?;

        info!(
            buckets = grid.len(),
            bias_buckets = bias.len(),
            fragility_buckets = fragility.len(),
            "pipeline run complete"
        );

        Ok(BiasReport {
            features,
            sentiment,
            bias,
            fragility,
        })
    }
}

/// One bucket's worth of incremental output. Series that are still warming
/// up (features before `lookback`, bias before `warmup`, fragility before
/// its settling window) read as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasUpdate {
    pub bucket: DateTime<Utc>,
    pub feature: Option<FeatureVector>,
    pub sentiment: SentimentAggregate,
    pub bias: Option<BiasScore>,
    pub fragility: Option<FragilityIndex>,
}

/// Incremental pipeline: accepts one new bucket at a time and produces that
/// bucket's outputs in bounded time, without reprocessing history.
///
/// Holds only small rolling state (trailing closes, decay accumulators,
/// z-score windows, the current run length and trailing ranges). The state
/// is exclusively owned; share across threads only with external
/// synchronization.
#[derive(Debug, Clone)]
pub struct IncrementalBias {
    config: EngineConfig,
    last_bucket: Option<DateTime<Utc>>,
    features: FeatureState,
    news: ChannelState,
    social: ChannelState,
    fusion: FusionState,
    fragility: FragilityState,
}

impl IncrementalBias {
    /// Validate the configuration and build an empty incremental state.
    pub fn new(config: EngineConfig) -> Result<Self, BiasError> {
        config.validate()?;
        Ok(Self {
            features: FeatureState::new(config.lookback, config.effective_momentum_window()),
            news: ChannelState::new(config.news),
            social: ChannelState::new(config.social),
            fusion: FusionState::new(&config),
            fragility: FragilityState::new(config.fragility, config.effective_vol_window()),
            last_bucket: None,
            config,
        })
    }

    /// Accept the next bar together with the sentiment items belonging to
    /// its bucket.
    ///
    /// # Errors
    /// - `Alignment` when the bar does not advance the grid (same or earlier
    ///   bucket than the previous push).
    pub fn push(
        &mut self,
        bar: &PriceBar,
        news_items: &[SentimentItem],
        social_items: &[SentimentItem],
    ) -> Result<BiasUpdate, BiasError> {
        let bucket = self.config.bucket_granularity.truncate(bar.timestamp);
        if let Some(last) = self.last_bucket {
            if bucket <= last {
                return Err(BiasError::Alignment {
                    component: "incremental pipeline",
                    detail: format!("bucket {bucket} does not advance past {last}"),
                });
            }
        }
        self.last_bucket = Some(bucket);

        let news_pairs: Vec<(f64, f64)> = news_items
            .iter()
            .filter_map(|item| usable_pair(item, Channel::News))
            .collect();
        let social_pairs: Vec<(f64, f64)> = social_items
            .iter()
            .filter_map(|item| usable_pair(item, Channel::Social))
            .collect();

        let (news_score, news_coverage) = self.news.push_bucket(&news_pairs);
        let (social_score, social_coverage) = self.social.push_bucket(&social_pairs);
        let sentiment = SentimentAggregate {
            bucket,
            news_score,
            social_score,
            news_coverage,
            social_coverage,
        };

        let feature = self.features.push(bar, bucket);
        let bias = feature
            .as_ref()
            .and_then(|fv| self.fusion.push(fv, &sentiment));
        let fragility = match (&bias, &feature) {
            (Some(score), Some(fv)) => self.fragility.push(score, fv.range_pct),
            _ => None,
        };

        debug!(
            bucket = %bucket,
            has_feature = feature.is_some(),
            has_bias = bias.is_some(),
            has_fragility = fragility.is_some(),
            "incremental bucket processed"
        );

        Ok(BiasUpdate {
            bucket,
            feature,
            sentiment,
            bias,
            fragility,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(i: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i as i64)
    }

    fn bar(i: u32, close: f64) -> PriceBar {
        PriceBar {
            timestamp: day(i) + Duration::hours(21),
            open: close * 0.995,
            high: close * 1.012,
            low: close * 0.988,
            close,
            volume: 10_000.0,
        }
    }

    fn item(i: u32, channel: Channel, polarity: f64, confidence: f64) -> SentimentItem {
        SentimentItem {
            timestamp: day(i) + Duration::hours(9),
            polarity,
            confidence,
            channel,
        }
    }

    /// Small but fully warmed-up configuration used across the tests.
    fn config() -> EngineConfig {
        EngineConfig {
            lookback: 6,
            warmup: 4,
            ..EngineConfig::default()
        }
    }

    /// A wavy close series so no rolling window degenerates.
    fn wavy_close(i: u32) -> f64 {
        100.0 + 4.0 * (i as f64 * 0.8).sin() + 0.3 * i as f64
    }

    fn window(
        days: u32,
    ) -> (Vec<PriceBar>, Vec<SentimentItem>, Vec<SentimentItem>) {
        let bars: Vec<PriceBar> = (0..days).map(|i| bar(i, wavy_close(i))).collect();
        let news: Vec<SentimentItem> = (0..days)
            .map(|i| item(i, Channel::News, (i as f64 * 0.6).sin() * 0.8, 0.9))
            .collect();
        let social: Vec<SentimentItem> = (0..days)
            .map(|i| item(i, Channel::Social, (i as f64 * 0.4).cos() * 0.5, 0.7))
            .collect();
        (bars, news, social)
    }

    #[test]
    fn report_series_cover_expected_ranges() {
        let (bars, news, social) = window(20);
        let cfg = config();
        let report = BiasPipeline::new(cfg.clone())
            .unwrap()
            .run(&bars, &news, &social)
            .unwrap();

        assert_eq!(report.sentiment.len(), 20);
        assert_eq!(report.features.len(), 20 - cfg.lookback + 1);
        assert_eq!(report.bias.len(), report.features.len() - cfg.warmup + 1);
        assert_eq!(
            report.fragility.len(),
            report.bias.len() - cfg.effective_vol_window() + 1
        );

        // Each series is keyed by bucket and stays aligned with the next.
        assert_eq!(report.features[0].bucket, day(cfg.lookback as u32 - 1));
        assert_eq!(
            report.bias[0].bucket,
            day((cfg.lookback + cfg.warmup - 2) as u32)
        );
    }

    #[test]
    fn invalid_config_fails_before_any_computation() {
        let mut cfg = config();
        cfg.news.decay = 2.0;
        assert!(matches!(
            BiasPipeline::new(cfg),
            Err(BiasError::Configuration { .. })
        ));
    }

    #[test]
    fn bias_values_stay_bounded() {
        let (bars, news, social) = window(40);
        let report = BiasPipeline::new(config())
            .unwrap()
            .run(&bars, &news, &social)
            .unwrap();
        for score in &report.bias {
            assert!((-1.0..=1.0).contains(&score.value));
        }
        for frag in &report.fragility {
            assert!((0.0..=1.0).contains(&frag.fragility));
        }
    }

    #[test]
    fn rerun_on_identical_inputs_is_identical() {
        let (bars, news, social) = window(25);
        let pipeline = BiasPipeline::new(config()).unwrap();
        let a = pipeline.run(&bars, &news, &social).unwrap();
        let b = pipeline.run(&bars, &news, &social).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rising_prices_with_positive_sentiment_push_bias_up() {
        // Strictly rising closes, constant positive polarity at confidence 1.
        let bars: Vec<PriceBar> = (0..16).map(|i| bar(i, 100.0 + 2.0 * i as f64)).collect();
        let news: Vec<SentimentItem> = (0..16)
            .map(|i| item(i, Channel::News, 0.8, 1.0))
            .collect();
        let social: Vec<SentimentItem> = (0..16)
            .map(|i| item(i, Channel::Social, 0.8, 1.0))
            .collect();

        let report = BiasPipeline::new(config())
            .unwrap()
            .run(&bars, &news, &social)
            .unwrap();

        let last = report.bias.last().unwrap();
        assert!(last.price_component > 0.0);
        assert!(last.news_component > 0.0);
        assert!(last.social_component > 0.0);
        assert!(last.value > 0.0);
    }

    #[test]
    fn incremental_reproduces_batch_outputs() {
        let (bars, news, social) = window(30);
        let cfg = config();

        let report = BiasPipeline::new(cfg.clone())
            .unwrap()
            .run(&bars, &news, &social)
            .unwrap();

        let mut incremental = IncrementalBias::new(cfg).unwrap();
        let mut features = Vec::new();
        let mut sentiment = Vec::new();
        let mut bias = Vec::new();
        let mut fragility = Vec::new();

        for (i, b) in bars.iter().enumerate() {
            let update = incremental
                .push(b, &news[i..i + 1], &social[i..i + 1])
                .unwrap();
            sentiment.push(update.sentiment);
            features.extend(update.feature);
            bias.extend(update.bias);
            fragility.extend(update.fragility);
        }

        assert_eq!(features, report.features);
        assert_eq!(sentiment, report.sentiment);
        assert_eq!(bias, report.bias);
        assert_eq!(fragility, report.fragility);
    }

    #[test]
    fn incremental_rejects_non_advancing_bucket() {
        let mut incremental = IncrementalBias::new(config()).unwrap();
        let b = bar(0, 100.0);
        incremental.push(&b, &[], &[]).unwrap();
        assert!(matches!(
            incremental.push(&b, &[], &[]),
            Err(BiasError::Alignment { .. })
        ));
    }

    #[test]
    fn window_shorter_than_lookback_fails() {
        let (bars, news, social) = window(4);
        let err = BiasPipeline::new(config())
            .unwrap()
            .run(&bars, &news, &social)
            .unwrap_err();
        assert!(matches!(err, BiasError::InsufficientData { .. }));
    }

    #[test]
    fn empty_news_channel_fails_with_no_data() {
        let (bars, _, social) = window(20);
        let err = BiasPipeline::new(config())
            .unwrap()
            .run(&bars, &[], &social)
            .unwrap_err();
        assert_eq!(
            err,
            BiasError::NoData {
                channel: Channel::News
            }
        );
    }

    #[test]
    fn report_serializes_for_the_visualization_collaborator() {
        let (bars, news, social) = window(20);
        let report = BiasPipeline::new(config())
            .unwrap()
            .run(&bars, &news, &social)
            .unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"bias\""));
        assert!(json.contains("\"fragility\""));
        let back: BiasReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
