use serde::{Deserialize, Serialize};

use super::types::Symbol;

/// Coarse classification of a watched instrument.
///
/// Serialized with the lowercase labels the store has always used; an
/// upstream type string that fits no bucket lands on [`Unknown`](Self::Unknown)
/// (stored as the empty string).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Stock,
    Etf,
    Forex,
    Crypto,
    #[default]
    #[serde(rename = "", other)]
    Unknown,
}

impl InstrumentKind {
    /// Bucket an upstream instrument-type string.
    ///
    /// Covers both providers' vocabularies: Finnhub's "Common Stock"/"ETP"
    /// style and Twelve Data's "Physical Currency"/"Digital Currency".
    pub fn classify_upstream(raw: &str) -> Self {
        let t = raw.to_lowercase();
        if t.is_empty() {
            Self::Unknown
        } else if t.contains("forex") || t.contains("fx") || t.contains("physical currency") {
            Self::Forex
        } else if t.contains("crypto") || t.contains("digital currency") {
            Self::Crypto
        } else if t.contains("etf") || t.contains("etp") {
            Self::Etf
        } else {
            Self::Stock
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Etf => "etf",
            Self::Forex => "forex",
            Self::Crypto => "crypto",
            Self::Unknown => "",
        }
    }
}

/// One watched instrument.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEntry {
    /// Canonical symbol, immutable once watched
    pub symbol: Symbol,

    /// Display name chosen at add time
    #[serde(default)]
    pub name: String,

    /// Instrument classification
    #[serde(default, rename = "type")]
    pub kind: InstrumentKind,
}

impl WatchEntry {
    pub fn new(symbol: impl Into<Symbol>, name: impl Into<String>, kind: InstrumentKind) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            kind,
        }
    }
}

/// Ordered watchlist, newest entry first, one entry per symbol.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watchlist {
    entries: Vec<WatchEntry>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default list seeded on first run: a couple of liquid defaults plus
    /// the active provider's gold-spot convention.
    pub fn starter(gold_symbol: &str) -> Self {
        Self {
            entries: vec![
                WatchEntry::new("AAPL", "Apple Inc.", InstrumentKind::Stock),
                WatchEntry::new("BINANCE:BTCUSDT", "Bitcoin", InstrumentKind::Crypto),
                WatchEntry::new(gold_symbol, "Gold Spot", InstrumentKind::Forex),
                WatchEntry::new("MSFT", "Microsoft", InstrumentKind::Stock),
            ],
        }
    }

    /// Add an entry at the front. Returns false (leaving the list untouched)
    /// when the symbol is already watched.
    pub fn add(&mut self, entry: WatchEntry) -> bool {
        if self.contains(&entry.symbol) {
            return false;
        }
        self.entries.insert(0, entry);
        true
    }

    /// Remove by symbol, returning the removed entry if it existed.
    pub fn remove(&mut self, symbol: &str) -> Option<WatchEntry> {
        let idx = self.entries.iter().position(|e| e.symbol == symbol)?;
        Some(self.entries.remove(idx))
    }

    /// Swap one symbol for another in place, keeping position, name and kind.
    /// Used when the gold-spot convention changes with the provider.
    pub fn replace_symbol(&mut self, old: &str, new: &str) -> bool {
        if old == new || self.contains(new) {
            return false;
        }
        match self.entries.iter_mut().find(|e| e.symbol == old) {
            Some(entry) => {
                entry.symbol = new.to_string();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.entries.iter().any(|e| e.symbol == symbol)
    }

    pub fn entries(&self) -> &[WatchEntry] {
        &self.entries
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.symbol.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
