// =============================================================================
// Bias Fusion Engine — weighted composite of normalized channels
// =============================================================================
//
// Per bucket:
//
//   price_signal = blend · trend + (1 - blend) · momentum
//   channel_t    = tanh(rolling_norm(channel_t))             in [-1, 1]
//   ŵ            = (w_price, w_news · cov_news, w_social · cov_social)
//                  rescaled so the effective weights still sum to 1
//   value        = Σ ŵ_i · channel_i, clamped to [-1, 1]
//
// Low-coverage sentiment buckets contribute proportionally less weight; an
// imputed bucket (coverage 0) drops out entirely for that bucket and its
// weight flows to the remaining channels. `range_pct` never enters the bias
// sign — it feeds the fragility estimator instead.

use tracing::{debug, trace};

use crate::config::{EngineConfig, WEIGHT_TOLERANCE};
use crate::error::BiasError;
use crate::fusion::normalize::RollingZScore;
use crate::types::{BiasScore, FeatureVector, SentimentAggregate};

/// Rolling fusion state: one z-score window per channel plus the weight
/// configuration. Accepts one aligned bucket at a time.
#[derive(Debug, Clone)]
pub struct FusionState {
    w_price: f64,
    w_news: f64,
    w_social: f64,
    blend: f64,
    price_z: RollingZScore,
    news_z: RollingZScore,
    social_z: RollingZScore,
}

impl FusionState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            w_price: config.weights.price,
            w_news: config.weights.news,
            w_social: config.weights.social,
            blend: config.trend_momentum_blend,
            price_z: RollingZScore::new(config.warmup),
            news_z: RollingZScore::new(config.warmup),
            social_z: RollingZScore::new(config.warmup),
        }
    }

    /// Accept one aligned bucket; returns the composite score once the
    /// warm-up window has filled (earlier buckets are withheld).
    pub fn push(
        &mut self,
        feature: &FeatureVector,
        sentiment: &SentimentAggregate,
    ) -> Option<BiasScore> {
        let price_signal = self.blend * feature.trend + (1.0 - self.blend) * feature.momentum;

        // All three windows fill in lockstep, so the three Options agree.
        let price_z = self.price_z.push(price_signal);
        let news_z = self.news_z.push(sentiment.news_score);
        let social_z = self.social_z.push(sentiment.social_score);
        let (price_z, news_z, social_z) = match (price_z, news_z, social_z) {
            (Some(p), Some(n), Some(s)) => (p, n, s),
            _ => return None,
        };

        // Coverage-scaled effective weights, renormalized per bucket.
        let eff_price = self.w_price;
        let eff_news = self.w_news * sentiment.news_coverage;
        let eff_social = self.w_social * sentiment.social_coverage;
        let eff_sum = eff_price + eff_news + eff_social;

        if eff_sum <= WEIGHT_TOLERANCE {
            // Nothing carries weight this bucket (all-imputed sentiment and
            // a zero price weight) — emit a neutral reading.
            trace!(bucket = %feature.bucket, "zero effective weight, neutral bias");
            return Some(BiasScore {
                bucket: feature.bucket,
                value: 0.0,
                price_component: 0.0,
                news_component: 0.0,
                social_component: 0.0,
            });
        }

        let price_component = eff_price / eff_sum * price_z.tanh();
        let news_component = eff_news / eff_sum * news_z.tanh();
        let social_component = eff_social / eff_sum * social_z.tanh();

        let value = (price_component + news_component + social_component).clamp(-1.0, 1.0);

        Some(BiasScore {
            bucket: feature.bucket,
            value,
            price_component,
            news_component,
            social_component,
        })
    }
}

/// Fuse aligned feature and sentiment series into one `BiasScore` per bucket
/// from `warmup` onward.
///
/// # Errors
/// - `Configuration` when the weight vector is invalid.
/// - `Alignment` when the two series do not share identical bucket keys.
/// - `InsufficientData` when the aligned window is shorter than `warmup`.
pub fn fuse(
    features: &[FeatureVector],
    sentiment: &[SentimentAggregate],
    config: &EngineConfig,
) -> Result<Vec<BiasScore>, BiasError> {
    config.validate()?;

    if features.len() != sentiment.len() {
        return Err(BiasError::Alignment {
            component: "fusion engine",
            detail: format!(
                "feature series has {} buckets, sentiment series has {}",
                features.len(),
                sentiment.len()
            ),
        });
    }
    for (fv, agg) in features.iter().zip(sentiment) {
        if fv.bucket != agg.bucket {
            return Err(BiasError::Alignment {
                component: "fusion engine",
                detail: format!(
                    "bucket mismatch: features at {}, sentiment at {}",
                    fv.bucket, agg.bucket
                ),
            });
        }
    }
    if features.len() < config.warmup {
        return Err(BiasError::InsufficientData {
            component: "fusion engine",
            required: config.warmup,
            supplied: features.len(),
        });
    }

    let mut state = FusionState::new(config);
    let scores: Vec<BiasScore> = features
        .iter()
        .zip(sentiment)
        .filter_map(|(fv, agg)| state.push(fv, agg))
        .collect();

    debug!(
        buckets = features.len(),
        scores = scores.len(),
        warmup = config.warmup,
        "bias fused"
    );

    Ok(scores)
}
