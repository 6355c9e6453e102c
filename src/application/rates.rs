use crate::domain::investment::Amount;
use crate::domain::ports::RateFeedArc;
use crate::domain::rate::{ExchangeRate, Quote};
use rust_decimal::Decimal;
use tracing::warn;

/// Quotes a converted estimate for an investment amount.
///
/// Infallible by contract: any feed failure (timeout, malformed payload,
/// non-positive rate) degrades to the deterministic fallback multiplier. A
/// single attempt, no retries; a slow quote must not hold up the flow and the
/// card path does not need the converted amount at all.
pub struct RateQuoter {
    feed: RateFeedArc,
}

impl RateQuoter {
    pub fn new(feed: RateFeedArc) -> Self {
        Self { feed }
    }

    pub async fn quote(&self, amount: Amount) -> Quote {
        let rate = match self.feed.usd_rate().await {
            Ok(rate) if rate > Decimal::ZERO => ExchangeRate::live(rate),
            Ok(rate) => {
                warn!(%rate, "rate feed returned non-positive rate, using fallback");
                ExchangeRate::fallback()
            }
            Err(err) => {
                warn!(error = %err, "rate feed unavailable, using fallback");
                ExchangeRate::fallback()
            }
        };
        Quote::new(amount.value(), rate)
    }
}
