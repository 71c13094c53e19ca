//! Symbol mapping and fallback resolution.
//!
//! Pure, stateless translation rules between the canonical symbols the
//! watchlist stores and the forms individual providers want:
//!
//! - [`remap_regional`] rewrites a dotted regional-suffix ticker into the
//!   colon-delimited venue-qualified form the alternate provider uses. Only
//!   consulted on the entitlement-fallback path.
//! - [`crypto_venue_fallback`] proposes an equivalent pair on a
//!   high-liquidity venue for a small fixed set of crypto symbols when the
//!   primary venue has no candles.
//! - [`classify`] buckets a symbol into the instrument class that drives
//!   per-class endpoint selection.

/// Regional ticker suffix to venue tag, e.g. `SAP.DE` -> `SAP:XETRA`.
const REGIONAL_SUFFIXES: &[(&str, &str)] = &[
    (".DE", "XETRA"),
    (".F", "FRA"),
    (".L", "LSE"),
    (".HK", "HKEX"),
    (".SZ", "SZSE"),
    (".SS", "SSE"),
];

/// Instrument class of a symbol, derived from its shape.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymbolClass {
    /// `OANDA:`-prefixed pair
    Forex,
    /// Any other venue-qualified `EXCHANGE:PAIR` symbol
    Crypto,
    /// Plain ticker
    Equity,
}

/// Classify a symbol by shape: `OANDA:` prefix means forex, any other colon
/// means crypto, everything else is treated as an equity/ETF ticker.
pub fn classify(symbol: &str) -> SymbolClass {
    if symbol.starts_with("OANDA:") {
        SymbolClass::Forex
    } else if symbol.contains(':') {
        SymbolClass::Crypto
    } else {
        SymbolClass::Equity
    }
}

/// Translate a dotted regional-suffix ticker into the venue-qualified form
/// the alternate provider understands. Symbols without a known suffix pass
/// through unchanged; the suffix match is case-insensitive.
pub fn remap_regional(symbol: &str) -> String {
    for (suffix, venue) in REGIONAL_SUFFIXES {
        if symbol.len() > suffix.len() {
            let (base, tail) = symbol.split_at(symbol.len() - suffix.len());
            if tail.eq_ignore_ascii_case(suffix) {
                return format!("{}:{}", base, venue);
            }
        }
    }
    symbol.to_string()
}

/// Alternate-venue mapping for the fixed set of crypto pairs known to be
/// missing from the primary venue's candle feed. Returns `None` for anything
/// outside the set; callers treat that as terminal for the lookup.
pub fn crypto_venue_fallback(symbol: &str) -> Option<&'static str> {
    let (exchange, pair) = symbol.split_once(':')?;
    match (
        exchange.to_ascii_uppercase().as_str(),
        pair.to_ascii_uppercase().as_str(),
    ) {
        ("COINBASE", "BTC-USD") => Some("BINANCE:BTCUSDT"),
        ("COINBASE", "ETH-USD") => Some("BINANCE:ETHUSDT"),
        _ => None,
    }
}
