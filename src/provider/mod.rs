//! Market data providers.
//!
//! Two REST providers are supported, selected at runtime by a single
//! configuration value:
//!
//! - [`TwelveDataProvider`] - broader instrument coverage, one quote endpoint
//!   for every class, trusts the upstream currency field
//! - [`FinnhubProvider`] - per-instrument-class endpoints, narrower free-tier
//!   entitlements, and the only provider with a streaming feed
//!
//! Shared search post-processing (ranking, dedupe, the gold-spot synonym)
//! lives here so both adapters return identically-shaped suggestion lists.

pub mod finnhub;
mod traits;
pub mod twelve_data;

pub use finnhub::FinnhubProvider;
pub use traits::MarketDataProvider;
pub use twelve_data::TwelveDataProvider;

use serde::{Deserialize, Serialize};

use crate::models::SearchResult;

/// Maximum number of search suggestions returned to the caller.
pub const SEARCH_LIMIT: usize = 10;

/// The closed set of selectable providers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "twelvedata")]
    TwelveData,
    #[default]
    Finnhub,
}

impl ProviderKind {
    /// Identifier persisted in the settings store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwelveData => "twelvedata",
            Self::Finnhub => "finnhub",
        }
    }

    /// Parse a persisted identifier; unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "twelvedata" => Some(Self::TwelveData),
            "finnhub" => Some(Self::Finnhub),
            _ => None,
        }
    }

    /// Human-readable provider name for notices.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::TwelveData => "Twelve Data",
            Self::Finnhub => "Finnhub",
        }
    }

    /// The provider's convention for the spot-gold instrument.
    pub fn gold_symbol(&self) -> &'static str {
        match self {
            Self::TwelveData => "XAU/USD",
            Self::Finnhub => "OANDA:XAU_USD",
        }
    }

    /// Whether this provider has a live streaming feed.
    pub fn streams(&self) -> bool {
        matches!(self, Self::Finnhub)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rank, deduplicate and cap raw upstream search results.
///
/// Exact symbol matches come first, then prefix matches, then substring
/// matches, then the rest; ties keep upstream order. Duplicate symbols keep
/// the first occurrence. At most [`SEARCH_LIMIT`] results survive.
pub(crate) fn rank_results(query: &str, results: Vec<SearchResult>) -> Vec<SearchResult> {
    let needle = query.trim().to_uppercase();
    let bucket = |symbol: &str| -> u8 {
        let s = symbol.to_uppercase();
        if s == needle {
            0
        } else if s.starts_with(&needle) {
            1
        } else if s.contains(&needle) {
            2
        } else {
            3
        }
    };

    let mut ranked = results;
    ranked.sort_by_key(|r| bucket(&r.symbol));

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for result in ranked {
        if seen.insert(result.symbol.clone()) {
            out.push(result);
        }
        if out.len() >= SEARCH_LIMIT {
            break;
        }
    }
    out
}

/// Whether a query is asking for spot gold. Both upstream search indexes miss
/// the instrument, so adapters prepend a synthetic result for it.
pub(crate) fn wants_gold(query: &str) -> bool {
    let q = query.trim().to_lowercase();
    q.starts_with("xau") || q.contains("gold")
}

/// Prepend the gold-spot synonym when the query asks for it, keeping the
/// result list deduplicated and capped.
pub(crate) fn apply_gold_synonym(query: &str, gold_symbol: &str, results: &mut Vec<SearchResult>) {
    if !wants_gold(query) {
        return;
    }
    results.retain(|r| r.symbol != gold_symbol);
    results.insert(0, SearchResult::gold_spot(gold_symbol));
    results.truncate(SEARCH_LIMIT);
}
