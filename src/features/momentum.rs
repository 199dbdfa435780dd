// =============================================================================
// Momentum — Rate of Change over a short window
// =============================================================================
//
// Measures recent acceleration distinct from the longer trend fit:
//   ROC = (close_t - close_{t-window}) / close_{t-window}
//
// Positive values indicate upward momentum; negative, downward.

/// Rate of change between the last close and the close `window` steps back.
///
/// Returns `None` when:
/// - `window` is zero.
/// - Fewer than `window + 1` closes are supplied.
/// - The reference close is zero or any involved value is non-finite.
pub fn rate_of_change(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() <= window {
        return None;
    }

    let last = closes[closes.len() - 1];
    let reference = closes[closes.len() - 1 - window];

    if !(last.is_finite() && reference.is_finite()) || reference == 0.0 {
        return None;
    }

    let roc = (last - reference) / reference;
    roc.is_finite().then_some(roc)
}
