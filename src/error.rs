// =============================================================================
// Error taxonomy for the prevailing-bias engine
// =============================================================================
//
// Every component validates its own inputs eagerly and fails fast instead of
// producing degraded output. Partial data *within* an otherwise valid window
// is never an error — it goes through the documented imputation / coverage
// mechanism. Errors carry enough context (component name, counts, bucket
// detail) to diagnose without inspecting internals. No retry happens here;
// retry belongs to the I/O collaborators.

use thiserror::Error;

use crate::types::Channel;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BiasError {
    /// The supplied window is shorter than a component's minimum requirement.
    #[error("{component}: insufficient data: need at least {required} buckets, got {supplied}")]
    InsufficientData {
        component: &'static str,
        required: usize,
        supplied: usize,
    },

    /// A required sentiment channel has zero observations across the entire
    /// window — there is no value to decay from.
    #[error("{channel} channel has no usable observations in the supplied window")]
    NoData { channel: Channel },

    /// Invalid configuration (negative weights, weights not summing to 1,
    /// decay outside (0, 1), non-positive windows).
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },

    /// Inputs reference incompatible bucket grids (mismatched keys,
    /// duplicated buckets, unordered series).
    #[error("{component}: incompatible bucket grids: {detail}")]
    Alignment {
        component: &'static str,
        detail: String,
    },
}

impl BiasError {
    /// Shorthand used by config validation.
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}
