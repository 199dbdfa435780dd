// =============================================================================
// Trailing Trend Slope — least-squares fit of log price
// =============================================================================
//
// Fits an ordinary least-squares line through log(close) over the supplied
// window and returns the slope scaled by the window length, i.e. the total
// log-return implied by the fitted line across the window. Working in log
// space makes the value comparable across assets with different price scales.
//
//   slope = Σ((x - x̄)(y - ȳ)) / Σ((x - x̄)²),   y = ln(close), x = 0..n
// =============================================================================

/// Compute the window-scaled log-close slope for the given `closes` slice.
///
/// Returns `None` when:
/// - Fewer than 2 closes are supplied (no line to fit).
/// - Any close is non-positive or non-finite (log undefined).
/// - The regression is degenerate.
pub fn log_close_slope(closes: &[f64]) -> Option<f64> {
    let n = closes.len();
    if n < 2 {
        return None;
    }

    let mut log_closes = Vec::with_capacity(n);
    for &close in closes {
        if !(close.is_finite() && close > 0.0) {
            return None;
        }
        log_closes.push(close.ln());
    }

    // OLS slope: x is the bucket index 0..n.
    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = log_closes.iter().sum::<f64>() / n_f;

    let mut numerator = 0.0_f64;
    let mut denominator = 0.0_f64;
    for (i, &y) in log_closes.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }

    if denominator.abs() < f64::EPSILON {
        return None;
    }

    let scaled = (numerator / denominator) * n_f;
    scaled.is_finite().then_some(scaled)
}
