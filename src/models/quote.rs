use serde::{Deserialize, Serialize};

use super::types::Currency;

/// Most recent known price point for a symbol.
///
/// `last` and `prev_close` are non-negative finite numbers when present;
/// absence is represented as `None`, never as zero or NaN. Both the poll
/// orchestrator and the live-tick merge engine overwrite these fields in
/// place, last writer wins.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Quote {
    /// Last traded/known price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<f64>,

    /// Previous session close, basis for percent change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_close: Option<f64>,

    /// Timestamp of the quote in Unix milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<i64>,

    /// Quote currency (e.g. "USD", "EUR")
    pub ccy: Currency,
}

impl Quote {
    /// Create a quote, sanitizing the price fields on the way in.
    pub fn new(last: Option<f64>, prev_close: Option<f64>, t: Option<i64>, ccy: impl Into<Currency>) -> Self {
        Self {
            last: coerce_price(last),
            prev_close: coerce_price(prev_close),
            t,
            ccy: ccy.into(),
        }
    }

    /// Percent change of `last` against `prev_close`.
    ///
    /// Returns `None` when either side is absent or `prev_close` is zero;
    /// a zero previous close must never be used as a divisor.
    pub fn percent_change(&self) -> Option<f64> {
        match (self.last, self.prev_close) {
            (Some(last), Some(prev)) if prev > 0.0 => Some((last - prev) / prev * 100.0),
            _ => None,
        }
    }
}

/// Coerce an upstream numeric into a usable price.
///
/// Anything non-finite or negative becomes `None`; downstream renders that
/// as "unknown" instead of crashing or showing garbage.
pub fn coerce_price(raw: Option<f64>) -> Option<f64> {
    raw.filter(|v| v.is_finite() && *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_new_sanitizes() {
        let quote = Quote::new(Some(f64::NAN), Some(-3.0), Some(1_704_067_200_000), "USD");
        assert!(quote.last.is_none());
        assert!(quote.prev_close.is_none());
        assert_eq!(quote.t, Some(1_704_067_200_000));
        assert_eq!(quote.ccy, "USD");
    }

    #[test]
    fn test_percent_change() {
        let quote = Quote::new(Some(110.0), Some(100.0), None, "USD");
        assert_eq!(quote.percent_change(), Some(10.0));
    }

    #[test]
    fn test_percent_change_negative() {
        let quote = Quote::new(Some(95.0), Some(100.0), None, "USD");
        assert_eq!(quote.percent_change(), Some(-5.0));
    }

    #[test]
    fn test_percent_change_zero_prev_close_is_unavailable() {
        let quote = Quote::new(Some(42.0), Some(0.0), None, "USD");
        assert_eq!(quote.percent_change(), None);
    }

    #[test]
    fn test_percent_change_missing_sides() {
        let quote = Quote::new(None, Some(100.0), None, "USD");
        assert_eq!(quote.percent_change(), None);

        let quote = Quote::new(Some(100.0), None, None, "USD");
        assert_eq!(quote.percent_change(), None);
    }

    #[test]
    fn test_coerce_price() {
        assert_eq!(coerce_price(Some(1.5)), Some(1.5));
        assert_eq!(coerce_price(Some(0.0)), Some(0.0));
        assert_eq!(coerce_price(Some(f64::NAN)), None);
        assert_eq!(coerce_price(Some(f64::INFINITY)), None);
        assert_eq!(coerce_price(Some(-0.01)), None);
        assert_eq!(coerce_price(None), None);
    }
}
