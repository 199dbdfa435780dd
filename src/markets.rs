// =============================================================================
// Prediction-Market Overlay — implied-probability bias and divergence
// =============================================================================
//
// Prediction markets quote implied probabilities in [0, 1]; 0.5 is the
// directionless midpoint. The overlay combines one or more already-fetched
// probability series into a single directional series (positive = the market
// leans bullish on the underlying question), and measures how far the
// prevailing bias has drifted from it.
//
// Retrieval of the probability series belongs to an external collaborator;
// everything here is pure computation over supplied observations. The
// overlay is NOT a fusion channel — it is an auxiliary series consumers can
// plot against the composite bias.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::types::{BiasScore, Observation};

/// One prediction market's implied-probability history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSeries {
    pub market_id: String,
    pub points: Vec<Observation>,
}

/// Combine implied-probability series into a directional overlay.
///
/// Series are inner-joined on their timestamps, each centered at the 0.5
/// midpoint, and summed under the per-market weights (1.0 each when
/// `weights` is `None`; markets absent from a supplied map weigh 0).
/// Returns an empty series when no markets are supplied, no timestamp is
/// shared by all of them, or the weights sum to zero.
pub fn implied_probability_bias(
    markets: &[MarketSeries],
    weights: Option<&HashMap<String, f64>>,
) -> Vec<Observation> {
    if markets.is_empty() {
        return Vec::new();
    }

    let mut columns: Vec<(f64, BTreeMap<DateTime<Utc>, f64>)> = Vec::with_capacity(markets.len());
    for market in markets {
        let weight = match weights {
            Some(map) => map.get(&market.market_id).copied().unwrap_or(0.0),
            None => 1.0,
        };
        let mut column = BTreeMap::new();
        for point in &market.points {
            if point.value.is_finite() {
                column.insert(point.timestamp, point.value);
            } else {
                trace!(
                    market = %market.market_id,
                    timestamp = %point.timestamp,
                    "non-finite probability, skipping"
                );
            }
        }
        columns.push((weight, column));
    }

    let weight_sum: f64 = columns.iter().map(|(w, _)| w).sum();
    if weight_sum == 0.0 {
        return Vec::new();
    }

    // Inner join: timestamps present in every series.
    let mut shared: BTreeSet<DateTime<Utc>> = columns[0].1.keys().copied().collect();
    for (_, column) in &columns[1..] {
        shared.retain(|ts| column.contains_key(ts));
    }

    let overlay: Vec<Observation> = shared
        .into_iter()
        .map(|timestamp| {
            let value: f64 = columns
                .iter()
                .map(|(weight, column)| {
                    column.get(&timestamp).map_or(0.0, |p| (p - 0.5) * weight)
                })
                .sum();
            Observation { timestamp, value }
        })
        .collect();

    debug!(
        markets = markets.len(),
        points = overlay.len(),
        "implied-probability overlay computed"
    );

    overlay
}

/// Standardize a column against its own mean and population σ; a flat
/// column reads as all zeros.
fn standardize(values: &[f64]) -> Vec<f64> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if !std.is_finite() || std < f64::EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - mean) / std).collect()
}

/// Rolling divergence between the prevailing bias and a market overlay.
///
/// The two series are inner-joined on bucket timestamps, each standardized
/// over the joined window, subtracted (bias minus market), and smoothed
/// with a trailing mean of up to `window` buckets (emitted once
/// `max(1, window / 2)` values are available). A `window` of 0 or 1 skips
/// the smoothing. Either side empty, or no shared buckets, yields an empty
/// series.
pub fn bias_market_divergence(
    bias: &[BiasScore],
    market: &[Observation],
    window: usize,
) -> Vec<Observation> {
    if bias.is_empty() || market.is_empty() {
        return Vec::new();
    }

    let market_by_ts: BTreeMap<DateTime<Utc>, f64> = market
        .iter()
        .filter(|obs| obs.value.is_finite())
        .map(|obs| (obs.timestamp, obs.value))
        .collect();

    let mut timestamps = Vec::new();
    let mut bias_column = Vec::new();
    let mut market_column = Vec::new();
    for score in bias {
        if let Some(&value) = market_by_ts.get(&score.bucket) {
            timestamps.push(score.bucket);
            bias_column.push(score.value);
            market_column.push(value);
        }
    }
    if timestamps.is_empty() {
        return Vec::new();
    }

    let bias_z = standardize(&bias_column);
    let market_z = standardize(&market_column);
    let raw: Vec<f64> = bias_z
        .iter()
        .zip(&market_z)
        .map(|(b, m)| b - m)
        .collect();

    if window <= 1 {
        return timestamps
            .into_iter()
            .zip(raw)
            .map(|(timestamp, value)| Observation { timestamp, value })
            .collect();
    }

    let min_periods = (window / 2).max(1);
    let mut smoothed = Vec::with_capacity(raw.len());
    for (i, &timestamp) in timestamps.iter().enumerate() {
        let start = (i + 1).saturating_sub(window);
        let tail = &raw[start..=i];
        if tail.len() < min_periods {
            continue;
        }
        let value = tail.iter().sum::<f64>() / tail.len() as f64;
        smoothed.push(Observation { timestamp, value });
    }
    smoothed
}
