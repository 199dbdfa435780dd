// =============================================================================
// Sentiment Aggregation Module
// =============================================================================
//
// Turns raw per-item sentiment streams (news, social) into time-bucketed,
// decay-weighted aggregate scores on the canonical grid:
// - Confidence-weighted mean per bucket
// - Exponential decay forward-fill across empty buckets
// - Coverage accounting for how much real data backed each score

pub mod aggregator;

pub use aggregator::{aggregate, ChannelState};
