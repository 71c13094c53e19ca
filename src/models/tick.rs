use serde::Deserialize;

use super::types::Symbol;

/// One trade event from the streaming feed.
///
/// Wire shape inside a `{"type":"trade","data":[...]}` batch: `s` symbol,
/// `p` price, `t` Unix milliseconds.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TradeTick {
    /// Symbol the trade belongs to
    #[serde(rename = "s")]
    pub symbol: Symbol,

    /// Trade price
    #[serde(rename = "p")]
    pub price: f64,

    /// Trade time in Unix milliseconds
    #[serde(rename = "t")]
    pub t: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_wire_parsing() {
        let json = r#"{"s":"BINANCE:BTCUSDT","p":61234.5,"t":1704067200123,"v":0.002}"#;
        let tick: TradeTick = serde_json::from_str(json).unwrap();
        assert_eq!(tick.symbol, "BINANCE:BTCUSDT");
        assert_eq!(tick.price, 61234.5);
        assert_eq!(tick.t, 1_704_067_200_123);
    }
}
