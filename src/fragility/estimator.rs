// =============================================================================
// Fragility Estimator — reversal-risk from the bias trajectory
// =============================================================================
//
// Per bucket, three rescaled drivers enter a configurable convex combination:
//
//   divergence — population σ of {price, news, social} components divided by
//                `divergence_scale`, clamped to [0, 1]. High divergence
//                means the "consensus" is actually split.
//   run term   — 1 - run_decay^run_length, saturating instead of unbounded.
//                `run_length` counts buckets since sign(value) last changed
//                and resets to 0 on any flip, including through strict zero.
//   volatility — mean of the trailing `vol_window` realized ranges,
//                tanh-rescaled.
//
//   fragility = clamp(w_div · divergence + w_run · run + w_vol · vol, 0, 1)
//
// A sign flip resets the run but never forces fragility itself to reset —
// the flip's released stress shows up through the divergence and volatility
// terms on its own.

use std::collections::VecDeque;

use tracing::debug;

use crate::config::FragilityParams;
use crate::error::BiasError;
use crate::types::{BiasScore, FragilityIndex};

/// Mean realized range that saturates the volatility driver.
const VOL_SCALE: f64 = 0.02;

/// Three-way sign: -1 / 0 / +1, with an exact zero its own state so a flip
/// through zero still reads as a change.
fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// Population standard deviation of the three bias components.
fn component_spread(score: &BiasScore) -> f64 {
    let components = [
        score.price_component,
        score.news_component,
        score.social_component,
    ];
    let mean = components.iter().sum::<f64>() / 3.0;
    let variance = components.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / 3.0;
    variance.sqrt()
}

/// Rolling estimator state: current run, previous sign, and the trailing
/// realized-range window. Accepts one bias bucket at a time.
#[derive(Debug, Clone)]
pub struct FragilityState {
    params: FragilityParams,
    vol_window: usize,
    prev_sign: Option<i8>,
    run_length: u32,
    ranges: VecDeque<Option<f64>>,
}

impl FragilityState {
    pub fn new(params: FragilityParams, vol_window: usize) -> Self {
        Self {
            params,
            vol_window,
            prev_sign: None,
            run_length: 0,
            ranges: VecDeque::with_capacity(vol_window + 1),
        }
    }

    /// Accept one bias bucket with its realized range; returns the
    /// fragility reading once the settling window has filled.
    pub fn push(&mut self, score: &BiasScore, range_pct: Option<f64>) -> Option<FragilityIndex> {
        let current = sign(score.value);
        match self.prev_sign {
            Some(prev) if prev == current => self.run_length += 1,
            _ => self.run_length = 0,
        }
        self.prev_sign = Some(current);

        self.ranges.push_back(range_pct);
        while self.ranges.len() > self.vol_window {
            self.ranges.pop_front();
        }
        if self.ranges.len() < self.vol_window {
            // Settling: run/sign state advances, output is withheld.
            return None;
        }

        let divergence = (component_spread(score) / self.params.divergence_scale).clamp(0.0, 1.0);

        let run_term = 1.0 - self.params.run_decay.powi(self.run_length as i32);

        let observed: Vec<f64> = self.ranges.iter().filter_map(|r| *r).collect();
        let vol_term = if observed.is_empty() {
            0.0
        } else {
            let mean = observed.iter().sum::<f64>() / observed.len() as f64;
            (mean / VOL_SCALE).tanh()
        };

        let fragility = (self.params.w_divergence * divergence
            + self.params.w_run * run_term
            + self.params.w_volatility * vol_term)
            .clamp(0.0, 1.0);

        Some(FragilityIndex {
            bucket: score.bucket,
            fragility,
            run_length: self.run_length,
            divergence,
        })
    }
}

/// Produce one `FragilityIndex` per bias bucket after the settling window.
///
/// `ranges` carries the realized range aligned bucket-for-bucket with
/// `bias` (missing where the bar's close was unusable).
///
/// # Errors
/// - `Alignment` when the two inputs differ in length.
/// - `InsufficientData` when the series is shorter than the settling window.
pub fn estimate(
    bias: &[BiasScore],
    ranges: &[Option<f64>],
    params: &FragilityParams,
    vol_window: usize,
) -> Result<Vec<FragilityIndex>, BiasError> {
    if bias.len() != ranges.len() {
        return Err(BiasError::Alignment {
            component: "fragility estimator",
            detail: format!(
                "bias series has {} buckets, range series has {}",
                bias.len(),
                ranges.len()
            ),
        });
    }
    if bias.len() < vol_window {
        return Err(BiasError::InsufficientData {
            component: "fragility estimator",
            required: vol_window,
            supplied: bias.len(),
        });
    }

    let mut state = FragilityState::new(*params, vol_window);
    let index: Vec<FragilityIndex> = bias
        .iter()
        .zip(ranges)
        .filter_map(|(score, &range)| state.push(score, range))
        .collect();

    debug!(
        buckets = bias.len(),
        emitted = index.len(),
        vol_window,
        "fragility estimated"
    );

    Ok(index)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn day(i: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i as i64)
    }

    fn score(i: u32, price: f64, news: f64, social: f64) -> BiasScore {
        BiasScore {
            bucket: day(i),
            value: (price + news + social).clamp(-1.0, 1.0),
            price_component: price,
            news_component: news,
            social_component: social,
        }
    }

    fn params() -> FragilityParams {
        FragilityParams::default()
    }

    #[test]
    fn run_length_counts_consecutive_same_sign_buckets() {
        let bias: Vec<_> = (0..5).map(|i| score(i, 0.2, 0.1, 0.1)).collect();
        let ranges = vec![Some(0.01); 5];
        let out = estimate(&bias, &ranges, &params(), 1).unwrap();
        let runs: Vec<u32> = out.iter().map(|f| f.run_length).collect();
        assert_eq!(runs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn sign_flip_resets_run_to_exactly_zero() {
        let bias = vec![
            score(0, 0.2, 0.1, 0.1),
            score(1, 0.2, 0.1, 0.1),
            score(2, -0.2, -0.1, -0.1),
            score(3, -0.2, -0.1, -0.1),
        ];
        let ranges = vec![Some(0.01); 4];
        let out = estimate(&bias, &ranges, &params(), 1).unwrap();
        assert_eq!(out[1].run_length, 1);
        assert_eq!(out[2].run_length, 0);
        assert_eq!(out[3].run_length, 1);
    }

    #[test]
    fn flip_through_strict_zero_resets() {
        let bias = vec![
            score(0, 0.2, 0.1, 0.1),
            score(1, 0.0, 0.0, 0.0),
            score(2, 0.2, 0.1, 0.1),
        ];
        let ranges = vec![Some(0.01); 3];
        let out = estimate(&bias, &ranges, &params(), 1).unwrap();
        assert_eq!(out[1].run_length, 0);
        assert_eq!(out[2].run_length, 0);
    }

    #[test]
    fn split_components_diverge_near_scale_top() {
        let split = score(0, 0.8, -0.7, 0.1);
        let agreed = score(1, 0.3, 0.3, 0.3);
        let ranges = vec![Some(0.01); 2];
        let out = estimate(&[split, agreed], &ranges, &params(), 1).unwrap();
        assert!(
            out[0].divergence > 0.95,
            "split components should read near the top of the scale, got {}",
            out[0].divergence
        );
        assert!((out[1].divergence - 0.0).abs() < 1e-12);
        assert!(out[0].divergence > out[1].divergence);
    }

    #[test]
    fn fragility_monotone_in_divergence() {
        // Same run history and volatility, increasing component spread.
        let mut spreads = Vec::new();
        for (a, b) in [(0.30, 0.30), (0.45, 0.15), (0.60, 0.00)] {
            let bias = vec![score(0, a, b, 0.30)];
            let out = estimate(&bias, &[Some(0.01)], &params(), 1).unwrap();
            spreads.push(out[0].fragility);
        }
        assert!(spreads[0] <= spreads[1] && spreads[1] <= spreads[2]);
    }

    #[test]
    fn run_term_saturates() {
        let bias: Vec<_> = (0..200).map(|i| score(i, 0.2, 0.2, 0.2)).collect();
        let ranges = vec![Some(0.01); 200];
        let out = estimate(&bias, &ranges, &params(), 1).unwrap();
        let last = out.last().unwrap();
        assert!(last.fragility <= 1.0);
        // The run driver alone contributes at most its weight.
        let prev = &out[out.len() - 2];
        assert!((last.fragility - prev.fragility).abs() < 1e-3);
    }

    #[test]
    fn higher_volatility_raises_fragility() {
        let bias: Vec<_> = (0..6).map(|i| score(i, 0.2, 0.2, 0.2)).collect();
        let calm = estimate(&bias, &vec![Some(0.005); 6], &params(), 3).unwrap();
        let wild = estimate(&bias, &vec![Some(0.08); 6], &params(), 3).unwrap();
        for (c, w) in calm.iter().zip(&wild) {
            assert!(w.fragility > c.fragility);
        }
    }

    #[test]
    fn missing_ranges_are_skipped_not_zeroed() {
        let bias: Vec<_> = (0..4).map(|i| score(i, 0.2, 0.2, 0.2)).collect();
        let with_gap = vec![Some(0.04), None, Some(0.04), Some(0.04)];
        let out = estimate(&bias, &with_gap, &params(), 2).unwrap();
        // Bucket 1's window is [0.04, None]: the mean uses the observed
        // value alone instead of diluting it with zero.
        let full = estimate(&bias, &vec![Some(0.04); 4], &params(), 2).unwrap();
        assert!((out[0].fragility - full[0].fragility).abs() < 1e-12);
    }

    #[test]
    fn settling_window_withholds_early_buckets() {
        let bias: Vec<_> = (0..6).map(|i| score(i, 0.2, 0.2, 0.2)).collect();
        let ranges = vec![Some(0.01); 6];
        let out = estimate(&bias, &ranges, &params(), 4).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].bucket, day(3));
        // Run state still advanced during settling.
        assert_eq!(out[0].run_length, 3);
    }

    #[test]
    fn series_shorter_than_settling_window_fails() {
        let bias: Vec<_> = (0..2).map(|i| score(i, 0.2, 0.2, 0.2)).collect();
        assert!(matches!(
            estimate(&bias, &[Some(0.01), Some(0.01)], &params(), 3),
            Err(BiasError::InsufficientData { .. })
        ));
    }

    #[test]
    fn mismatched_lengths_fail_with_alignment() {
        let bias: Vec<_> = (0..3).map(|i| score(i, 0.2, 0.2, 0.2)).collect();
        assert!(matches!(
            estimate(&bias, &[Some(0.01); 2], &params(), 1),
            Err(BiasError::Alignment { .. })
        ));
    }

    #[test]
    fn fragility_stays_in_unit_interval() {
        let bias: Vec<_> = (0..50)
            .map(|i| {
                let s = if i % 7 < 4 { 1.0 } else { -1.0 };
                score(i, 0.8 * s, -0.7 * s, 0.1 * s)
            })
            .collect();
        let ranges: Vec<_> = (0..50).map(|i| Some(0.001 * i as f64)).collect();
        let out = estimate(&bias, &ranges, &params(), 3).unwrap();
        for f in &out {
            assert!((0.0..=1.0).contains(&f.fragility));
            assert!((0.0..=1.0).contains(&f.divergence));
        }
    }
}
