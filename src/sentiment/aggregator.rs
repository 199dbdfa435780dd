// =============================================================================
// Sentiment Aggregator — bucketed, decay-filled channel scores
// =============================================================================
//
// Items are grouped into their timestamp's grid bucket. Within a bucket the
// aggregate is the confidence-weighted mean of polarities:
//
//   score = Σ polarity · confidence / Σ confidence
//
// Buckets with zero items get coverage 0 and a provisional score via
// exponential decay forward-fill: the last known aggregate carried forward,
// multiplied by decay^gap, pulling stale sentiment toward 0 as the gap grows.
//
// The two channels aggregate independently with independently configured
// decay rates — news arrives in bursts, social near-continuously.

use tracing::{debug, trace};

use crate::config::{ChannelParams, EngineConfig};
use crate::error::BiasError;
use crate::grid::BucketGrid;
use crate::types::{Channel, SentimentAggregate, SentimentItem};

/// Rolling per-channel accumulator: the last known aggregate with its decay
/// applied so far. Sufficient to accept one bucket of items at a time.
#[derive(Debug, Clone)]
pub struct ChannelState {
    decay: f64,
    coverage_target: usize,
    /// Last aggregate, pre-multiplied by the decay accumulated across the
    /// empty buckets seen since it was real.
    carried: Option<f64>,
}

impl ChannelState {
    pub fn new(params: ChannelParams) -> Self {
        Self {
            decay: params.decay,
            coverage_target: params.coverage_target,
            carried: None,
        }
    }

    /// Fold one bucket's raw items into a `(score, coverage)` pair.
    ///
    /// `items` holds the `(polarity, confidence)` pairs that mapped into the
    /// bucket; empty means the bucket is imputed.
    pub fn push_bucket(&mut self, items: &[(f64, f64)]) -> (f64, f64) {
        if items.is_empty() {
            // Decay forward-fill; before the first real item there is
            // nothing to decay from and the bucket reads neutral.
            let score = match self.carried.as_mut() {
                Some(carried) => {
                    *carried *= self.decay;
                    *carried
                }
                None => 0.0,
            };
            return (score, 0.0);
        }

        let weight_sum: f64 = items.iter().map(|&(_, c)| c).sum();
        let score = if weight_sum > 0.0 {
            items.iter().map(|&(p, c)| p * c).sum::<f64>() / weight_sum
        } else {
            // All-zero confidence still counts as a real (neutral) reading.
            0.0
        };

        let coverage = (items.len() as f64 / self.coverage_target as f64).min(1.0);

        self.carried = Some(score);
        (score, coverage)
    }
}

/// Clamp a raw item into a `(polarity, confidence)` pair, dropping items on
/// the wrong channel or with non-finite fields.
pub(crate) fn usable_pair(item: &SentimentItem, channel: Channel) -> Option<(f64, f64)> {
    if item.channel != channel {
        trace!(
            expected = %channel,
            got = %item.channel,
            "sentiment item on wrong channel, skipping"
        );
        return None;
    }
    if !(item.polarity.is_finite() && item.confidence.is_finite()) {
        trace!(timestamp = %item.timestamp, "non-finite sentiment item, skipping");
        return None;
    }
    Some((
        item.polarity.clamp(-1.0, 1.0),
        item.confidence.clamp(0.0, 1.0),
    ))
}

/// Map raw items onto grid positions as `(polarity, confidence)` pairs.
///
/// An item falling into a non-trading gap counts toward the first grid
/// bucket at or after it — never a past bucket, which would leak the future
/// into history. Items outside the grid range, with the wrong channel, or
/// with non-finite fields are dropped.
fn bucket_items(
    items: &[SentimentItem],
    channel: Channel,
    grid: &BucketGrid,
) -> Vec<Vec<(f64, f64)>> {
    let mut bucketed: Vec<Vec<(f64, f64)>> = vec![Vec::new(); grid.len()];

    for item in items {
        let Some(pair) = usable_pair(item, channel) else {
            continue;
        };

        let key = grid.granularity().truncate(item.timestamp);
        let index = match grid.first_at_or_after(key) {
            Some(index) if key >= grid.buckets()[0] => index,
            _ => {
                trace!(timestamp = %item.timestamp, "sentiment item outside window, skipping");
                continue;
            }
        };

        bucketed[index].push(pair);
    }

    bucketed
}

/// Produce one `SentimentAggregate` per grid bucket from the two raw
/// channel streams.
///
/// # Errors
/// - `NoData` when a channel has zero usable items across the entire window
///   (a single empty bucket is not an error — that is what the decay fill
///   is for).
pub fn aggregate(
    news_items: &[SentimentItem],
    social_items: &[SentimentItem],
    grid: &BucketGrid,
    config: &EngineConfig,
) -> Result<Vec<SentimentAggregate>, BiasError> {
    let news_buckets = bucket_items(news_items, Channel::News, grid);
    let social_buckets = bucket_items(social_items, Channel::Social, grid);

    for (channel, buckets) in [
        (Channel::News, &news_buckets),
        (Channel::Social, &social_buckets),
    ] {
        if buckets.iter().all(|b| b.is_empty()) {
            return Err(BiasError::NoData { channel });
        }
    }

    let mut news_state = ChannelState::new(config.news);
    let mut social_state = ChannelState::new(config.social);

    let mut aggregates = Vec::with_capacity(grid.len());
    for (index, &bucket) in grid.buckets().iter().enumerate() {
        let (news_score, news_coverage) = news_state.push_bucket(&news_buckets[index]);
        let (social_score, social_coverage) = social_state.push_bucket(&social_buckets[index]);

        aggregates.push(SentimentAggregate {
            bucket,
            news_score,
            social_score,
            news_coverage,
            social_coverage,
        });
    }

    debug!(
        buckets = aggregates.len(),
        news_items = news_items.len(),
        social_items = social_items.len(),
        "sentiment aggregated"
    );

    Ok(aggregates)
}
