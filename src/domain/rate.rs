use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::time::SystemTime;

/// Deterministic USD multiplier applied when the live feed cannot be
/// reached. A failed quote must never block the flow from opening.
pub const FALLBACK_USD_RATE: Decimal = dec!(1650);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    Live,
    Fallback,
}

/// A USD to local-currency multiplier and where it came from.
///
/// Never cached across flow lifecycles: the quote is re-fetched every time
/// the flow opens, since the amount is fixed at open time and rates are
/// time-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExchangeRate {
    pub rate: Decimal,
    pub source: RateSource,
    #[serde(skip)]
    pub fetched_at: SystemTime,
}

impl ExchangeRate {
    pub fn live(rate: Decimal) -> Self {
        Self {
            rate,
            source: RateSource::Live,
            fetched_at: SystemTime::now(),
        }
    }

    pub fn fallback() -> Self {
        Self {
            rate: FALLBACK_USD_RATE,
            source: RateSource::Fallback,
            fetched_at: SystemTime::now(),
        }
    }
}

/// A converted estimate for one investment amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quote {
    pub amount_usd: Decimal,
    pub converted_amount: Decimal,
    pub rate: ExchangeRate,
}

impl Quote {
    pub fn new(amount_usd: Decimal, rate: ExchangeRate) -> Self {
        Self {
            amount_usd,
            converted_amount: amount_usd * rate.rate,
            rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_conversion() {
        let quote = Quote::new(dec!(500), ExchangeRate::live(dec!(1650)));
        assert_eq!(quote.converted_amount, dec!(825000));
        assert_eq!(quote.rate.source, RateSource::Live);
    }

    #[test]
    fn test_fallback_rate_is_deterministic() {
        let rate = ExchangeRate::fallback();
        assert_eq!(rate.rate, dec!(1650));
        assert_eq!(rate.source, RateSource::Fallback);
    }
}
