// =============================================================================
// Fragility Estimation Module
// =============================================================================
//
// Turns the composite bias trajectory into a reversal-risk index from three
// drivers: component disagreement (divergence), persistence of the current
// sign (run length, saturating), and short-horizon realized volatility.

pub mod estimator;

pub use estimator::{estimate, FragilityState};
