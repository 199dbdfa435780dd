// =============================================================================
// Market Feature Extraction Module
// =============================================================================
//
// Pure, side-effect-free feature computations over price bars:
// - Trailing log-price trend (least-squares fit)
// - Short-window momentum (rate of change)
// - Realized intrabar range
//
// The low-level functions return `Option<T>` so callers are forced to handle
// insufficient-data and numerical-edge-case scenarios.

pub mod extractor;
pub mod momentum;
pub mod slope;

pub use extractor::{extract, FeatureState};
pub use momentum::rate_of_change;
pub use slope::log_close_slope;
