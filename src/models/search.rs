//! Search result model for symbol lookup.

use serde::{Deserialize, Serialize};

use super::types::Symbol;
use super::watchlist::{InstrumentKind, WatchEntry};

/// Result from a ticker/symbol search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Symbol as the provider wants it requested (e.g. "AAPL", "OANDA:XAU_USD")
    pub symbol: Symbol,

    /// Short display name (e.g. "Apple Inc")
    pub name: String,

    /// Instrument classification
    #[serde(rename = "type")]
    pub kind: InstrumentKind,
}

impl SearchResult {
    pub fn new(symbol: impl Into<Symbol>, name: impl Into<String>, kind: InstrumentKind) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            kind,
        }
    }

    /// The synthetic gold-spot result neither upstream search index surfaces.
    pub fn gold_spot(symbol: &str) -> Self {
        Self::new(symbol, "Gold Spot", InstrumentKind::Forex)
    }

    /// "SYMBOL — Name" line for suggestion lists.
    pub fn display(&self) -> String {
        if self.name.is_empty() {
            self.symbol.clone()
        } else {
            format!("{} — {}", self.symbol, self.name)
        }
    }
}

impl From<SearchResult> for WatchEntry {
    fn from(result: SearchResult) -> Self {
        WatchEntry::new(result.symbol, result.name, result.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_line() {
        let result = SearchResult::new("AAPL", "Apple Inc", InstrumentKind::Stock);
        assert_eq!(result.display(), "AAPL — Apple Inc");

        let bare = SearchResult::new("AAPL", "", InstrumentKind::Stock);
        assert_eq!(bare.display(), "AAPL");
    }

    #[test]
    fn test_into_watch_entry() {
        let entry: WatchEntry = SearchResult::gold_spot("XAU/USD").into();
        assert_eq!(entry.symbol, "XAU/USD");
        assert_eq!(entry.name, "Gold Spot");
        assert_eq!(entry.kind, InstrumentKind::Forex);
    }
}
