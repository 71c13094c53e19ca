//! USD to EUR conversion upkeep.
//!
//! The dashboard can display USD-quoted prices in EUR. The rate comes from
//! a free FX endpoint refreshed alongside every poll sweep; a failed fetch
//! keeps the previous rate so display conversion never stalls the sweep.
//! Only USD quotes are converted. Quotes already in another currency are
//! shown as reported.

use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::models::Currency;
use crate::net;

/// Rate used until the first successful refresh.
pub const DEFAULT_USD_EUR: f64 = 0.9;

const FX_URL: &str = "https://api.exchangerate.host/latest?base=USD&symbols=EUR";

#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: Option<EurRate>,
}

#[derive(Debug, Deserialize)]
struct EurRate {
    #[serde(rename = "EUR")]
    eur: Option<f64>,
}

/// Holds the current USD→EUR rate and performs display conversion.
pub struct FxConverter {
    rate: Mutex<f64>,
}

impl Default for FxConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FxConverter {
    pub fn new() -> Self {
        Self {
            rate: Mutex::new(DEFAULT_USD_EUR),
        }
    }

    fn lock_rate(&self) -> MutexGuard<'_, f64> {
        match self.rate.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("FX rate mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Current USD→EUR rate.
    pub fn rate(&self) -> f64 {
        *self.lock_rate()
    }

    /// Refresh the rate from the FX endpoint. Failures and nonsense rates
    /// are swallowed; the previous rate stays in effect.
    pub async fn refresh(&self, client: &Client, cancel: &CancellationToken) {
        match net::fetch_json::<RatesResponse>(client, FX_URL, cancel).await {
            Ok(resp) => {
                if let Some(rate) = resp
                    .rates
                    .and_then(|r| r.eur)
                    .filter(|r| r.is_finite() && *r > 0.0)
                {
                    *self.lock_rate() = rate;
                }
            }
            Err(err) => debug!("FX refresh failed, keeping previous rate: {}", err),
        }
    }

    /// Convert a price for display. USD prices become EUR when the user
    /// prefers EUR; every other currency passes through unchanged.
    pub fn convert(&self, price: f64, ccy: &str, prefer_eur: bool) -> (f64, Currency) {
        if prefer_eur && ccy == "USD" {
            (price * self.rate(), "EUR".to_string())
        } else {
            (price, ccy.to_string())
        }
    }

    #[cfg(test)]
    fn set_rate(&self, rate: f64) {
        *self.lock_rate() = rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_with_default_rate() {
        let fx = FxConverter::new();
        assert_eq!(fx.rate(), DEFAULT_USD_EUR);
    }

    #[test]
    fn test_converts_usd_when_preferred() {
        let fx = FxConverter::new();
        fx.set_rate(0.92);

        let (price, ccy) = fx.convert(100.0, "USD", true);
        assert!((price - 92.0).abs() < 1e-9);
        assert_eq!(ccy, "EUR");
    }

    #[test]
    fn test_usd_untouched_without_preference() {
        let fx = FxConverter::new();
        let (price, ccy) = fx.convert(100.0, "USD", false);
        assert_eq!(price, 100.0);
        assert_eq!(ccy, "USD");
    }

    #[test]
    fn test_non_usd_passes_through_even_when_preferred() {
        let fx = FxConverter::new();
        let (price, ccy) = fx.convert(100.0, "GBP", true);
        assert_eq!(price, 100.0);
        assert_eq!(ccy, "GBP");

        // An EUR quote is already in the display currency.
        let (price, ccy) = fx.convert(50.0, "EUR", true);
        assert_eq!(price, 50.0);
        assert_eq!(ccy, "EUR");
    }

    #[test]
    fn test_rates_response_parsing() {
        let json = r#"{"base":"USD","date":"2024-01-05","rates":{"EUR":0.9123}}"#;
        let resp: RatesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.rates.unwrap().eur, Some(0.9123));

        let json = r#"{"error":"rate limited"}"#;
        let resp: RatesResponse = serde_json::from_str(json).unwrap();
        assert!(resp.rates.is_none());
    }
}
