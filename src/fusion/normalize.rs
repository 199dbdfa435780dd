// =============================================================================
// Rolling Normalization — zero-anchored trailing z-score
// =============================================================================
//
// Normalizes a channel against its own trailing window. The deviation is
// measured from the channel's neutral point (zero) rather than the sample
// mean, with the root-mean-square of the window as the denominator:
//
//   z_t = x_t / rms(window),   rms = sqrt(mean(x_i²))
//
// Centering on the sample mean would erase the level information the
// composite reads: a persistently bullish channel would normalize to
// nothing. Anchoring at zero keeps the sign while still adapting the scale
// to the window.
//
// Output is withheld (not zero-filled) until `window` values have
// accumulated; afterwards the window slides one bucket at a time. A zero or
// non-finite rms (all-neutral window) reads as z = 0 — such a channel
// carries no directional information yet.
//
// The rms is recomputed from the retained window on every push rather than
// maintained as a running sum, so cancellation error cannot accumulate over
// long series.

use std::collections::VecDeque;

/// Trailing-window normalizer state. One instance per channel.
#[derive(Debug, Clone)]
pub struct RollingZScore {
    window: usize,
    values: VecDeque<f64>,
}

impl RollingZScore {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            values: VecDeque::with_capacity(window + 1),
        }
    }

    /// Number of values accumulated so far, capped at the window length.
    pub fn filled(&self) -> usize {
        self.values.len()
    }

    /// Accept the next raw value; returns its normalized score once the
    /// window is full, `None` during warm-up.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        self.values.push_back(value);
        while self.values.len() > self.window {
            self.values.pop_front();
        }
        if self.values.len() < self.window {
            return None;
        }

        let n = self.values.len() as f64;
        let mean_square = self.values.iter().map(|v| v * v).sum::<f64>() / n;
        let rms = mean_square.sqrt();

        if !rms.is_finite() || rms < f64::EPSILON {
            return Some(0.0);
        }

        Some(value / rms)
    }
}
