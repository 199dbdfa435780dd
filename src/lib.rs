// =============================================================================
// Prevailing Bias — Signal-Fusion & Fragility-Estimation Engine
// =============================================================================
//
// Estimates a time-varying directional sentiment state ("prevailing bias") by
// fusing price-derived technical features with news and social sentiment
// channels, and quantifies how reversal-prone that bias currently is.
//
// The engine is pure computation over a supplied window of observations: all
// I/O (price bars, scored sentiment items, rendering) belongs to external
// collaborators. Four components form a linear pipeline:
//
//   1. features   — price bars  -> normalized trend / range / momentum
//   2. sentiment  — raw items   -> bucketed, decay-filled aggregates
//   3. fusion     — (1) + (2)   -> weighted composite bias score
//   4. fragility  — (3)         -> reversal-risk index
//
// `pipeline` wires them together in batch and incremental form; `markets`
// provides the optional prediction-market overlay.
// =============================================================================

pub mod config;
pub mod error;
pub mod features;
pub mod fragility;
pub mod fusion;
pub mod grid;
pub mod markets;
pub mod pipeline;
pub mod sentiment;
pub mod types;

pub use config::{ChannelParams, EngineConfig, FragilityParams, FusionWeights};
pub use error::BiasError;
pub use grid::{BucketGranularity, BucketGrid};
pub use markets::{bias_market_divergence, implied_probability_bias, MarketSeries};
pub use pipeline::{BiasPipeline, BiasReport, BiasUpdate, IncrementalBias};
pub use types::{
    BiasScore, Channel, FeatureVector, FragilityIndex, Observation, PriceBar,
    SentimentAggregate, SentimentItem,
};
