//! Twelve Data market data provider implementation.
//!
//! This module provides market data from the Twelve Data API:
//! - Quotes via the /quote endpoint (one endpoint for every instrument class)
//! - Intraday history via /time_series
//! - Symbol search via /symbol_search
//!
//! Twelve Data reports numeric fields as JSON strings and signals logical
//! errors in-band with `{"status":"error","message":...}` on a 200 response.
//! It is the only provider whose currency field is trusted as-is; the quote
//! carries whatever currency the upstream reports (uppercased, USD default).
//! API documentation: https://twelvedata.com/docs

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use urlencoding::encode;

use crate::errors::MarketDataError;
use crate::models::{coerce_price, HistoryPoint, HistorySeries, InstrumentKind, Quote, SearchResult};
use crate::net;
use crate::provider::{apply_gold_synonym, rank_results, MarketDataProvider, ProviderKind};

const BASE_URL: &str = "https://api.twelvedata.com";
const PROVIDER_ID: &str = "TWELVE_DATA";

/// Candle interval requested for the sparkline window.
const HISTORY_INTERVAL: &str = "15min";
/// Number of rows requested per history window.
const HISTORY_OUTPUT_SIZE: u32 = 200;

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /quote. Numeric fields arrive as strings.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// "error" when the provider rejects the request in-band
    status: Option<String>,
    /// Error message accompanying an error status
    message: Option<String>,
    /// Last price
    price: Option<Value>,
    /// Previous session close
    previous_close: Option<Value>,
    /// Quote time, "YYYY-MM-DD HH:MM:SS" or date-only
    datetime: Option<String>,
    /// Quote currency
    currency: Option<String>,
}

/// Response from /time_series.
#[derive(Debug, Deserialize)]
struct SeriesResponse {
    status: Option<String>,
    message: Option<String>,
    /// Candle rows; some plan tiers use `data` instead of `values`
    values: Option<Vec<SeriesRow>>,
    data: Option<Vec<SeriesRow>>,
}

/// One candle row of a time series.
#[derive(Debug, Deserialize)]
struct SeriesRow {
    datetime: Option<String>,
    close: Option<Value>,
}

/// Response from /symbol_search.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchItem>,
}

/// Individual search result item.
#[derive(Debug, Deserialize)]
struct SearchItem {
    symbol: Option<String>,
    instrument_name: Option<String>,
    /// Fallback display name on some plan tiers
    name: Option<String>,
    instrument_type: Option<String>,
    exchange: Option<String>,
}

// ============================================================================
// TwelveDataProvider
// ============================================================================

/// Twelve Data market data provider.
///
/// Broad instrument coverage (equities, ETFs, forex pairs, crypto pairs,
/// spot metals) through a single set of endpoints, authenticated by an
/// `apikey` query parameter.
pub struct TwelveDataProvider {
    client: Client,
    api_key: String,
}

impl TwelveDataProvider {
    /// Create a new Twelve Data provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: api_key.into(),
        }
    }

    fn require_key(&self) -> Result<(), MarketDataError> {
        if self.api_key.is_empty() {
            return Err(MarketDataError::MissingCredential {
                provider: PROVIDER_ID.to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Response Normalization
// ============================================================================

/// Coerce an untyped upstream numeric (string or number) into a float.
/// Anything else, including a string that fails to parse, is absent.
fn num(raw: Option<&Value>) -> Option<f64> {
    match raw? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Parse Twelve Data's "YYYY-MM-DD HH:MM:SS" (or date-only) timestamps into
/// Unix milliseconds. Unparsable input is treated as absent.
fn parse_datetime_ms(raw: Option<&str>) -> Option<i64> {
    let raw = raw?.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
    }
    None
}

fn check_status(status: Option<&str>, message: Option<String>) -> Result<(), MarketDataError> {
    if status == Some("error") {
        return Err(MarketDataError::Upstream {
            provider: PROVIDER_ID.to_string(),
            message: message.unwrap_or_else(|| "Provider error".to_string()),
        });
    }
    Ok(())
}

fn quote_from_response(resp: QuoteResponse) -> Result<Quote, MarketDataError> {
    check_status(resp.status.as_deref(), resp.message)?;

    let ccy = resp
        .currency
        .as_deref()
        .unwrap_or("USD")
        .to_uppercase();

    Ok(Quote::new(
        num(resp.price.as_ref()),
        num(resp.previous_close.as_ref()),
        parse_datetime_ms(resp.datetime.as_deref()),
        ccy,
    ))
}

fn series_from_response(resp: SeriesResponse) -> Result<HistorySeries, MarketDataError> {
    check_status(resp.status.as_deref(), resp.message)?;

    let rows = resp.values.or(resp.data).unwrap_or_default();
    let points = rows
        .iter()
        .filter_map(|row| {
            let t = parse_datetime_ms(row.datetime.as_deref())?;
            let p = coerce_price(num(row.close.as_ref()))?;
            Some(HistoryPoint { t, p })
        })
        .collect();

    Ok(HistorySeries::from_points(points))
}

// ============================================================================
// MarketDataProvider Implementation
// ============================================================================

#[async_trait]
impl MarketDataProvider for TwelveDataProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, MarketDataError> {
        let query = query.trim();
        if query.is_empty() || self.api_key.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Searching Twelve Data for '{}'", query);

        let url = format!(
            "{}/symbol_search?symbol={}&apikey={}",
            BASE_URL,
            encode(query),
            encode(&self.api_key)
        );
        let resp: SearchResponse = net::fetch_json(&self.client, &url, cancel).await?;

        let raw = resp
            .data
            .into_iter()
            .filter_map(|item| {
                let symbol = item.symbol?;
                let name = item
                    .instrument_name
                    .or(item.name)
                    .unwrap_or_else(|| symbol.clone());
                let kind = InstrumentKind::classify_upstream(
                    item.instrument_type
                        .or(item.exchange)
                        .as_deref()
                        .unwrap_or(""),
                );
                Some(SearchResult::new(symbol, name, kind))
            })
            .collect();

        let mut results = rank_results(query, raw);
        apply_gold_synonym(query, ProviderKind::TwelveData.gold_symbol(), &mut results);
        Ok(results)
    }

    async fn quote(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Quote, MarketDataError> {
        self.require_key()?;

        debug!("Fetching quote for {} from Twelve Data", symbol);

        let url = format!(
            "{}/quote?symbol={}&apikey={}",
            BASE_URL,
            encode(symbol),
            encode(&self.api_key)
        );
        let resp: QuoteResponse = net::fetch_json(&self.client, &url, cancel).await?;
        quote_from_response(resp)
    }

    async fn history(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<HistorySeries, MarketDataError> {
        self.require_key()?;

        debug!("Fetching time series for {} from Twelve Data", symbol);

        let url = format!(
            "{}/time_series?symbol={}&interval={}&outputsize={}&order=ASC&apikey={}",
            BASE_URL,
            encode(symbol),
            HISTORY_INTERVAL,
            HISTORY_OUTPUT_SIZE,
            encode(&self.api_key)
        );
        let resp: SeriesResponse = net::fetch_json(&self.client, &url, cancel).await?;
        series_from_response(resp)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id() {
        let provider = TwelveDataProvider::new("test_key");
        assert_eq!(provider.id(), "TWELVE_DATA");
    }

    #[test]
    fn test_quote_response_parsing_string_numerics() {
        let json = r#"{
            "symbol": "AAPL",
            "name": "Apple Inc",
            "exchange": "NASDAQ",
            "currency": "USD",
            "datetime": "2024-01-05 15:59:00",
            "price": "185.92",
            "previous_close": "184.25"
        }"#;

        let resp: QuoteResponse = serde_json::from_str(json).unwrap();
        let quote = quote_from_response(resp).unwrap();

        assert_eq!(quote.last, Some(185.92));
        assert_eq!(quote.prev_close, Some(184.25));
        assert_eq!(quote.ccy, "USD");
        assert!(quote.t.is_some());
    }

    #[test]
    fn test_quote_trusts_upstream_currency() {
        let json = r#"{"price": "132.40", "previous_close": "131.00", "currency": "eur"}"#;
        let resp: QuoteResponse = serde_json::from_str(json).unwrap();
        let quote = quote_from_response(resp).unwrap();
        assert_eq!(quote.ccy, "EUR");
    }

    #[test]
    fn test_quote_defaults_currency_to_usd() {
        let json = r#"{"price": "1.1"}"#;
        let resp: QuoteResponse = serde_json::from_str(json).unwrap();
        let quote = quote_from_response(resp).unwrap();
        assert_eq!(quote.ccy, "USD");
    }

    #[test]
    fn test_quote_error_status_is_upstream_error() {
        let json = r#"{"status": "error", "code": 404, "message": "symbol not found"}"#;
        let resp: QuoteResponse = serde_json::from_str(json).unwrap();
        match quote_from_response(resp).unwrap_err() {
            MarketDataError::Upstream { provider, message } => {
                assert_eq!(provider, "TWELVE_DATA");
                assert_eq!(message, "symbol not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_quote_unparsable_numerics_become_absent() {
        let json = r#"{"price": "n/a", "previous_close": null}"#;
        let resp: QuoteResponse = serde_json::from_str(json).unwrap();
        let quote = quote_from_response(resp).unwrap();
        assert!(quote.last.is_none());
        assert!(quote.prev_close.is_none());
    }

    #[test]
    fn test_num_coercion() {
        assert_eq!(num(Some(&serde_json::json!("42.5"))), Some(42.5));
        assert_eq!(num(Some(&serde_json::json!(42.5))), Some(42.5));
        assert_eq!(num(Some(&serde_json::json!(" 7 "))), Some(7.0));
        assert_eq!(num(Some(&serde_json::json!("oops"))), None);
        assert_eq!(num(Some(&serde_json::json!(null))), None);
        assert_eq!(num(None), None);
    }

    #[test]
    fn test_parse_datetime_ms() {
        assert_eq!(
            parse_datetime_ms(Some("2024-01-05 15:59:00")),
            Some(1_704_470_340_000)
        );
        assert_eq!(parse_datetime_ms(Some("2024-01-05")), Some(1_704_412_800_000));
        assert_eq!(parse_datetime_ms(Some("soon")), None);
        assert_eq!(parse_datetime_ms(None), None);
    }

    #[test]
    fn test_series_sorted_ascending() {
        let json = r#"{
            "values": [
                {"datetime": "2024-01-05 15:45:00", "close": "185.60"},
                {"datetime": "2024-01-05 15:15:00", "close": "185.10"},
                {"datetime": "2024-01-05 15:30:00", "close": "185.40"}
            ],
            "status": "ok"
        }"#;

        let resp: SeriesResponse = serde_json::from_str(json).unwrap();
        let series = series_from_response(resp).unwrap();

        let prices: Vec<_> = series.points().iter().map(|p| p.p).collect();
        assert_eq!(prices, vec![185.10, 185.40, 185.60]);
        assert!(series.points().windows(2).all(|w| w[0].t <= w[1].t));
    }

    #[test]
    fn test_series_accepts_data_key() {
        let json = r#"{"data": [{"datetime": "2024-01-05 15:45:00", "close": "185.60"}]}"#;
        let resp: SeriesResponse = serde_json::from_str(json).unwrap();
        let series = series_from_response(resp).unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_series_skips_unparsable_rows() {
        let json = r#"{
            "values": [
                {"datetime": "2024-01-05 15:45:00", "close": "185.60"},
                {"datetime": "garbage", "close": "185.10"},
                {"datetime": "2024-01-05 15:30:00", "close": "none"}
            ]
        }"#;

        let resp: SeriesResponse = serde_json::from_str(json).unwrap();
        let series = series_from_response(resp).unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_series_error_status() {
        let json = r#"{"status": "error", "message": "rate limit"}"#;
        let resp: SeriesResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            series_from_response(resp).unwrap_err(),
            MarketDataError::Upstream { .. }
        ));
    }

    #[tokio::test]
    async fn test_search_without_credential_is_silently_empty() {
        let provider = TwelveDataProvider::new("");
        let token = CancellationToken::new();
        let results = provider.search("AAPL", &token).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_with_empty_query_is_silently_empty() {
        let provider = TwelveDataProvider::new("test_key");
        let token = CancellationToken::new();
        let results = provider.search("   ", &token).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_quote_without_credential_fails_fast() {
        let provider = TwelveDataProvider::new("");
        let token = CancellationToken::new();
        let err = provider.quote("AAPL", &token).await.unwrap_err();
        assert!(matches!(err, MarketDataError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn test_history_without_credential_fails_fast() {
        let provider = TwelveDataProvider::new("");
        let token = CancellationToken::new();
        let err = provider.history("AAPL", &token).await.unwrap_err();
        assert!(matches!(err, MarketDataError::MissingCredential { .. }));
    }

    #[test]
    fn test_search_item_mapping() {
        let json = r#"{
            "data": [
                {"symbol": "XAU/USD", "instrument_name": "Gold Spot", "instrument_type": "Physical Currency"},
                {"symbol": "AAPL", "instrument_name": "Apple Inc", "instrument_type": "Common Stock"},
                {"instrument_name": "No Symbol Entry"}
            ]
        }"#;

        let resp: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data.len(), 3);
        assert_eq!(resp.data[0].symbol.as_deref(), Some("XAU/USD"));
        assert!(resp.data[2].symbol.is_none());
    }
}
