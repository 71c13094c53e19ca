//! Finnhub market data provider implementation.
//!
//! This module provides market data from the Finnhub API:
//! - Equity quotes via /quote, forex quotes via /forex/quote
//! - Crypto quotes derived from a trailing 24h one-minute candle window
//! - Intraday history via /stock/candle, /forex/candle and /crypto/candle
//! - Symbol search via /search
//! - Company logos via /stock/profile2
//!
//! Symbols are routed by shape: `OANDA:` prefixed pairs go through the forex
//! path, any other venue-prefixed symbol (`BINANCE:BTCUSDT`) through the
//! crypto path, everything else is treated as an equity. Finnhub surfaces
//! entitlement problems as HTTP 403; those are escalated to a dedicated
//! error so callers can fail over to another provider. All Finnhub prices
//! are reported in USD.
//! API documentation: https://finnhub.io/docs/api

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use urlencoding::encode;

use crate::errors::MarketDataError;
use crate::models::{coerce_price, HistoryPoint, HistorySeries, InstrumentKind, Quote, SearchResult};
use crate::net;
use crate::provider::{apply_gold_synonym, rank_results, MarketDataProvider, ProviderKind};
use crate::resolver::{classify, crypto_venue_fallback, SymbolClass};

const BASE_URL: &str = "https://finnhub.io/api/v1";
const PROVIDER_ID: &str = "FINNHUB";

/// Streaming endpoint; the trade feed authenticates with the same token.
pub const WS_URL: &str = "wss://ws.finnhub.io";

/// Candle resolution for the sparkline window, in minutes.
const HISTORY_RESOLUTION: &str = "15";
/// History lookback window.
const HISTORY_WINDOW_SECS: i64 = 14 * 86_400;
/// Resolution of the candle window a crypto quote is derived from.
const CRYPTO_QUOTE_RESOLUTION: &str = "1";
/// Lookback for the candle window a crypto quote is derived from.
const CRYPTO_QUOTE_WINDOW_SECS: i64 = 86_400;

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /quote and /forex/quote. Field names follow Finnhub's
/// terse wire format; the `price`/`prevClose` aliases show up on some
/// feeds.
#[derive(Debug, Default, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
    /// Previous close
    pc: Option<f64>,
    /// Quote timestamp, Unix seconds
    t: Option<i64>,
    price: Option<f64>,
    #[serde(rename = "prevClose")]
    prev_close: Option<f64>,
    ask: Option<f64>,
    bid: Option<f64>,
}

/// Response from the candle endpoints. Columnar arrays, one entry per
/// candle; `s` is "ok" or "no_data".
#[derive(Debug, Default, Deserialize)]
struct CandleResponse {
    s: Option<String>,
    /// Close prices
    #[serde(default)]
    c: Vec<f64>,
    /// Candle timestamps, Unix seconds
    #[serde(default)]
    t: Vec<i64>,
}

impl CandleResponse {
    fn is_ok(&self) -> bool {
        self.s.as_deref() == Some("ok")
    }
}

/// Response from /search.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchItem>,
}

/// Individual search result item.
#[derive(Debug, Deserialize)]
struct SearchItem {
    symbol: Option<String>,
    description: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Response from /stock/profile2; only the branding fields are read.
#[derive(Debug, Default, Deserialize)]
struct ProfileResponse {
    logo: Option<String>,
    weburl: Option<String>,
}

// ============================================================================
// FinnhubProvider
// ============================================================================

/// Finnhub market data provider.
///
/// REST quotes and candles for equities, forex and crypto, plus company
/// profiles for logo hydration. Authenticated by a `token` query parameter.
pub struct FinnhubProvider {
    client: Client,
    api_key: String,
}

impl FinnhubProvider {
    /// Create a new Finnhub provider with the given API key.
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

    /// Fetch and decode one endpoint, escalating HTTP 403 to an entitlement
    /// error so the caller can fail over instead of reporting it.
    async fn fetch<T: DeserializeOwned>(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<T, MarketDataError> {
        net::fetch_json(&self.client, url, cancel)
            .await
            .map_err(escalate_entitlement)
    }

    fn candle_url(&self, endpoint: &str, symbol: &str, resolution: &str, from: i64, to: i64) -> String {
        format!(
            "{}/{}?symbol={}&resolution={}&from={}&to={}&token={}",
            BASE_URL,
            endpoint,
            encode(symbol),
            resolution,
            from,
            to,
            encode(&self.api_key)
        )
    }

    // ------------------------------------------------------------------
    // Quote paths
    // ------------------------------------------------------------------

    async fn forex_quote(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Quote, MarketDataError> {
        let url = format!(
            "{}/forex/quote?symbol={}&token={}",
            BASE_URL,
            encode(symbol),
            encode(&self.api_key)
        );
        let resp: QuoteResponse = net::with_retry(cancel, || self.fetch(&url, cancel)).await?;
        Ok(forex_quote_from(resp, Utc::now().timestamp_millis()))
    }

    async fn equity_quote(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Quote, MarketDataError> {
        let url = format!(
            "{}/quote?symbol={}&token={}",
            BASE_URL,
            encode(symbol),
            encode(&self.api_key)
        );
        let resp: QuoteResponse = net::with_retry(cancel, || self.fetch(&url, cancel)).await?;
        Ok(equity_quote_from(resp, Utc::now().timestamp_millis()))
    }

    /// Crypto quote derived from a trailing 24h one-minute candle window.
    /// When the venue returns no data the symbol is retried once on a
    /// known-equivalent venue before giving up.
    async fn crypto_quote(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Quote, MarketDataError> {
        let to = Utc::now().timestamp();
        let from = to - CRYPTO_QUOTE_WINDOW_SECS;

        let url = self.candle_url("crypto/candle", symbol, CRYPTO_QUOTE_RESOLUTION, from, to);
        let mut candle: CandleResponse =
            net::with_retry(cancel, || self.fetch(&url, cancel)).await?;

        if !candle.is_ok() || candle.c.is_empty() {
            if let Some(alt) = crypto_venue_fallback(symbol) {
                debug!("No candle data for {}, retrying as {}", symbol, alt);
                let alt_url =
                    self.candle_url("crypto/candle", alt, CRYPTO_QUOTE_RESOLUTION, from, to);
                candle = net::with_retry(cancel, || self.fetch(&alt_url, cancel)).await?;
            }
        }

        crypto_quote_from(candle, to).ok_or_else(|| MarketDataError::NoData {
            symbol: symbol.to_string(),
        })
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<HistorySeries, MarketDataError> {
        let to = Utc::now().timestamp();
        let from = to - HISTORY_WINDOW_SECS;

        let endpoint = match classify(symbol) {
            SymbolClass::Forex => "forex/candle",
            SymbolClass::Crypto => "crypto/candle",
            SymbolClass::Equity => "stock/candle",
        };
        let url = self.candle_url(endpoint, symbol, HISTORY_RESOLUTION, from, to);
        let candle: CandleResponse =
            net::with_retry(cancel, || self.fetch(&url, cancel)).await?;

        Ok(series_from_candle(candle))
    }

    // ------------------------------------------------------------------
    // Logos
    // ------------------------------------------------------------------

    /// Fetch a logo URL for the symbol from the company profile. Falls back
    /// to a Clearbit logo derived from the company website when the profile
    /// carries none. `Ok(None)` means the upstream has no branding for this
    /// symbol; errors mean the lookup itself failed.
    pub async fn fetch_logo(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, MarketDataError> {
        self.require_key()?;

        let url = format!(
            "{}/stock/profile2?symbol={}&token={}",
            BASE_URL,
            encode(symbol),
            encode(&self.api_key)
        );
        let resp: ProfileResponse = self.fetch(&url, cancel).await?;
        Ok(logo_from_profile(resp))
    }
}

// ============================================================================
// Response Normalization
// ============================================================================

/// Escalate HTTP 403 into an entitlement error; everything else is
/// passed through unchanged.
fn escalate_entitlement(err: MarketDataError) -> MarketDataError {
    match err {
        MarketDataError::Transport { status: 403, .. } => MarketDataError::Entitlement {
            provider: PROVIDER_ID.to_string(),
        },
        other => other,
    }
}

fn forex_quote_from(resp: QuoteResponse, now_ms: i64) -> Quote {
    let last = resp.c.or(resp.ask).or(resp.bid);
    // Without an explicit previous close the pair is shown as unchanged.
    let prev = resp.pc.or(last);
    Quote::new(last, prev, Some(now_ms), "USD")
}

fn equity_quote_from(resp: QuoteResponse, now_ms: i64) -> Quote {
    // A zero current price means "no trade yet"; fall through to the
    // ask/bid the same way absence does.
    let last = resp
        .c
        .or(resp.price)
        .filter(|v| *v != 0.0)
        .or_else(|| resp.ask.filter(|v| *v != 0.0))
        .or(resp.bid);
    let prev = resp.pc.or(resp.prev_close).or(last);
    let t = match resp.t {
        Some(secs) if secs != 0 => secs * 1000,
        _ => now_ms,
    };
    Quote::new(last, prev, Some(t), "USD")
}

/// Derive a quote from a candle window: last close is the price, the
/// close before it the previous close, the last candle timestamp the
/// quote time.
fn crypto_quote_from(candle: CandleResponse, to_secs: i64) -> Option<Quote> {
    if !candle.is_ok() || candle.c.is_empty() {
        return None;
    }
    let n = candle.c.len();
    let last = candle.c.last().copied();
    let prev = if n > 1 { candle.c.get(n - 2).copied() } else { last };
    let t = candle.t.last().copied().unwrap_or(to_secs) * 1000;
    Some(Quote::new(last, prev, Some(t), "USD"))
}

/// Zip the columnar candle arrays into history points. A "no_data" status
/// yields an empty series rather than an error.
fn series_from_candle(candle: CandleResponse) -> HistorySeries {
    if !candle.is_ok() {
        return HistorySeries::default();
    }
    candle
        .t
        .iter()
        .zip(candle.c.iter())
        .filter_map(|(&t, &c)| {
            let p = coerce_price(Some(c))?;
            Some(HistoryPoint { t: t * 1000, p })
        })
        .collect()
}

fn logo_from_profile(resp: ProfileResponse) -> Option<String> {
    if let Some(logo) = resp.logo.filter(|l| !l.is_empty()) {
        return Some(logo);
    }
    let weburl = resp.weburl.filter(|w| !w.is_empty())?;
    let host = reqwest::Url::parse(&weburl).ok()?.host_str()?.to_string();
    Some(format!("https://logo.clearbit.com/{}", host))
}

// ============================================================================
// MarketDataProvider Implementation
// ============================================================================

#[async_trait]
impl MarketDataProvider for FinnhubProvider {
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

        debug!("Searching Finnhub for '{}'", query);

        let url = format!(
            "{}/search?q={}&token={}",
            BASE_URL,
            encode(query),
            encode(&self.api_key)
        );
        let resp: SearchResponse = self.fetch(&url, cancel).await?;

        let raw = resp
            .result
            .into_iter()
            .filter_map(|item| {
                let symbol = item.symbol?;
                let name = item.description.filter(|d| !d.is_empty())?;
                let kind = InstrumentKind::classify_upstream(item.kind.as_deref().unwrap_or(""));
                Some(SearchResult::new(symbol, name, kind))
            })
            .collect();

        let mut results = rank_results(query, raw);
        apply_gold_synonym(query, ProviderKind::Finnhub.gold_symbol(), &mut results);
        Ok(results)
    }

    async fn quote(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Quote, MarketDataError> {
        self.require_key()?;

        debug!("Fetching quote for {} from Finnhub", symbol);

        match classify(symbol) {
            SymbolClass::Forex => self.forex_quote(symbol, cancel).await,
            SymbolClass::Crypto => self.crypto_quote(symbol, cancel).await,
            SymbolClass::Equity => self.equity_quote(symbol, cancel).await,
        }
    }

    async fn history(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<HistorySeries, MarketDataError> {
        self.require_key()?;

        debug!("Fetching candles for {} from Finnhub", symbol);

        self.fetch_history(symbol, cancel).await
    }
}

// ============================================================================
// Tests
// ============================================================================
