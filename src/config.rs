// =============================================================================
// Engine Configuration — validated, serde-backed tunables
// =============================================================================
//
// Every tunable of the pipeline lives here. All fields carry
// `#[serde(default)]` so that loading an older config file never breaks when
// new fields are added, and the documented defaults double as the
// `Default` implementation.
//
// Invalid combinations fail fast through `validate()` before any computation
// runs. File persistence uses an atomic tmp + rename write to prevent
// corruption on crash.
// =============================================================================

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::BiasError;
use crate::grid::BucketGranularity;

/// Floating tolerance for "weights sum to 1" checks.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_lookback() -> usize {
    20
}

fn default_warmup() -> usize {
    10
}

fn default_blend() -> f64 {
    0.5
}

fn default_news_params() -> ChannelParams {
    ChannelParams {
        decay: 0.85,
        coverage_target: 3,
    }
}

fn default_social_params() -> ChannelParams {
    ChannelParams {
        decay: 0.95,
        coverage_target: 8,
    }
}

fn default_w_price() -> f64 {
    0.5
}

fn default_w_news() -> f64 {
    0.3
}

fn default_w_social() -> f64 {
    0.2
}

fn default_fragility_weight() -> f64 {
    1.0 / 3.0
}

fn default_run_decay() -> f64 {
    0.9
}

fn default_divergence_scale() -> f64 {
    0.5
}

// =============================================================================
// ChannelParams
// =============================================================================

/// Per-channel aggregation tunables.
///
/// News arrives in bursts, social near-continuously, so each channel gets
/// its own decay rate and coverage target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelParams {
    /// Geometric decay applied per empty grid bucket when forward-filling a
    /// stale aggregate. Must be inside (0, 1).
    pub decay: f64,

    /// Number of raw items at which a bucket counts as fully covered.
    pub coverage_target: usize,
}

// =============================================================================
// FusionWeights
// =============================================================================

/// Channel weights for the composite bias. Non-negative, summing to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    #[serde(default = "default_w_price")]
    pub price: f64,
    #[serde(default = "default_w_news")]
    pub news: f64,
    #[serde(default = "default_w_social")]
    pub social: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            price: default_w_price(),
            news: default_w_news(),
            social: default_w_social(),
        }
    }
}

// =============================================================================
// FragilityParams
// =============================================================================

/// Tunables for the fragility combination.
///
/// The three driver weights are a convex combination (default equal); the
/// run-length term saturates as `1 - run_decay^run_length` instead of
/// growing unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FragilityParams {
    #[serde(default = "default_fragility_weight")]
    pub w_divergence: f64,
    #[serde(default = "default_fragility_weight")]
    pub w_run: f64,
    #[serde(default = "default_fragility_weight")]
    pub w_volatility: f64,

    /// Saturation base for the run-length driver, inside (0, 1).
    #[serde(default = "default_run_decay")]
    pub run_decay: f64,

    /// Component spread (population std) that maps to divergence 1.0.
    #[serde(default = "default_divergence_scale")]
    pub divergence_scale: f64,

    /// Trailing buckets of `range_pct` feeding the volatility driver.
    /// 0 derives the effective momentum window.
    #[serde(default)]
    pub vol_window: usize,
}

impl Default for FragilityParams {
    fn default() -> Self {
        Self {
            w_divergence: default_fragility_weight(),
            w_run: default_fragility_weight(),
            w_volatility: default_fragility_weight(),
            run_decay: default_run_decay(),
            divergence_scale: default_divergence_scale(),
            vol_window: 0,
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Complete configuration surface of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bucket granularity of the canonical grid.
    #[serde(default)]
    pub bucket_granularity: BucketGranularity,

    /// Trailing buckets for the trend fit; minimum window the feature
    /// extractor accepts.
    #[serde(default = "default_lookback")]
    pub lookback: usize,

    /// Buckets of fused history required before normalized bias output is
    /// emitted.
    #[serde(default = "default_warmup")]
    pub warmup: usize,

    /// Short window for the momentum rate-of-change. 0 derives
    /// `lookback / 3` (floored, minimum 1).
    #[serde(default)]
    pub momentum_window: usize,

    /// News-channel aggregation parameters.
    #[serde(default = "default_news_params")]
    pub news: ChannelParams,

    /// Social-channel aggregation parameters.
    #[serde(default = "default_social_params")]
    pub social: ChannelParams,

    /// Channel weights for the composite bias.
    #[serde(default)]
    pub weights: FusionWeights,

    /// Share of `trend` vs `momentum` in the price signal; 0.5 is the
    /// equal blend.
    #[serde(default = "default_blend")]
    pub trend_momentum_blend: f64,

    /// Fragility combination tunables.
    #[serde(default)]
    pub fragility: FragilityParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bucket_granularity: BucketGranularity::default(),
            lookback: default_lookback(),
            warmup: default_warmup(),
            momentum_window: 0,
            news: default_news_params(),
            social: default_social_params(),
            weights: FusionWeights::default(),
            trend_momentum_blend: default_blend(),
            fragility: FragilityParams::default(),
        }
    }
}

impl EngineConfig {
    /// Momentum window with the `lookback / 3` derivation applied.
    pub fn effective_momentum_window(&self) -> usize {
        if self.momentum_window == 0 {
            (self.lookback / 3).max(1)
        } else {
            self.momentum_window
        }
    }

    /// Volatility window with the momentum-window derivation applied.
    pub fn effective_vol_window(&self) -> usize {
        if self.fragility.vol_window == 0 {
            self.effective_momentum_window()
        } else {
            self.fragility.vol_window
        }
    }

    /// Check every invariant of the configuration surface.
    ///
    /// Called by the pipeline before any computation; invalid combinations
    /// never reach the components.
    pub fn validate(&self) -> Result<(), BiasError> {
        if self.lookback < 2 {
            return Err(BiasError::config(format!(
                "lookback must be at least 2, got {}",
                self.lookback
            )));
        }
        if self.warmup == 0 {
            return Err(BiasError::config("warmup must be positive"));
        }
        if self.momentum_window != 0 && self.momentum_window >= self.lookback {
            return Err(BiasError::config(format!(
                "momentum_window ({}) must be shorter than lookback ({})",
                self.momentum_window, self.lookback
            )));
        }
        if !(0.0..=1.0).contains(&self.trend_momentum_blend) {
            return Err(BiasError::config(format!(
                "trend_momentum_blend must be within [0, 1], got {}",
                self.trend_momentum_blend
            )));
        }

        for (name, params) in [("news", &self.news), ("social", &self.social)] {
            if !(params.decay > 0.0 && params.decay < 1.0) {
                return Err(BiasError::config(format!(
                    "{name} decay must be inside (0, 1), got {}",
                    params.decay
                )));
            }
            if params.coverage_target == 0 {
                return Err(BiasError::config(format!(
                    "{name} coverage_target must be positive"
                )));
            }
        }

        let w = &self.weights;
        for (name, value) in [("price", w.price), ("news", w.news), ("social", w.social)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(BiasError::config(format!(
                    "weight for {name} must be non-negative, got {value}"
                )));
            }
        }
        let sum = w.price + w.news + w.social;
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(BiasError::config(format!(
                "channel weights must sum to 1, got {sum}"
            )));
        }

        let f = &self.fragility;
        for (name, value) in [
            ("divergence", f.w_divergence),
            ("run", f.w_run),
            ("volatility", f.w_volatility),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(BiasError::config(format!(
                    "fragility weight for {name} must be non-negative, got {value}"
                )));
            }
        }
        let fragility_sum = f.w_divergence + f.w_run + f.w_volatility;
        if (fragility_sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(BiasError::config(format!(
                "fragility weights must sum to 1, got {fragility_sum}"
            )));
        }
        if !(f.run_decay > 0.0 && f.run_decay < 1.0) {
            return Err(BiasError::config(format!(
                "run_decay must be inside (0, 1), got {}",
                f.run_decay
            )));
        }
        if !(f.divergence_scale.is_finite() && f.divergence_scale > 0.0) {
            return Err(BiasError::config(format!(
                "divergence_scale must be positive, got {}",
                f.divergence_scale
            )));
        }

        Ok(())
    }

    /// Load and validate configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BiasError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            BiasError::config(format!("failed to read config from {}: {e}", path.display()))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            BiasError::config(format!(
                "failed to parse config from {}: {e}",
                path.display()
            ))
        })?;

        config.validate()?;

        info!(
            path = %path.display(),
            granularity = %config.bucket_granularity,
            lookback = config.lookback,
            warmup = config.warmup,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BiasError> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| BiasError::config(format!("failed to serialise config: {e}")))?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content).map_err(|e| {
            BiasError::config(format!(
                "failed to write tmp config to {}: {e}",
                tmp_path.display()
            ))
        })?;

        std::fs::rename(&tmp_path, path).map_err(|e| {
            BiasError::config(format!(
                "failed to rename tmp config to {}: {e}",
                path.display()
            ))
        })?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}
