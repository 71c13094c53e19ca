//! Provider trait for market data sources.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::MarketDataError;
use crate::models::{HistorySeries, Quote, SearchResult};

/// A market data provider that can search symbols and fetch quotes and
/// recent history.
///
/// Exactly one provider is active at a time, selected by the engine's
/// configuration; the set of implementations is closed. Every method takes a
/// cancellation token: search requests are cancelled by newer keystrokes,
/// and poll fetches are cancelled on engine shutdown. A cancelled call
/// returns [`MarketDataError::Cancelled`] and nothing else.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Unique provider identifier (e.g. "TWELVE_DATA", "FINNHUB").
    fn id(&self) -> &'static str;

    /// Search for symbols matching a query.
    ///
    /// At most 10 results, deduplicated by symbol, exact matches first, then
    /// prefix, then substring, ties in upstream order. Silently returns an
    /// empty list when the query is empty or no credential is configured.
    async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, MarketDataError>;

    /// Fetch the latest quote for a symbol.
    async fn quote(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Quote, MarketDataError>;

    /// Fetch a bounded recent price-history window for a symbol, ascending
    /// by time. An upstream "no data" status yields an empty series.
    async fn history(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<HistorySeries, MarketDataError>;
}
