//! Shared market table.
//!
//! One record per watched symbol, written by poll sweeps and live trade
//! batches, read by whoever renders. Readers learn about changes through a
//! watch channel carrying a generation counter; the payload itself is
//! always pulled fresh via [`MarketTable::snapshot`].

use log::warn;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

use crate::models::{HistorySeries, MarketRecord, Quote, Symbol, TradeTick};

/// Concurrent symbol-to-record map with change signalling.
pub struct MarketTable {
    records: Mutex<HashMap<Symbol, MarketRecord>>,
    changes: watch::Sender<u64>,
}

impl Default for MarketTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketTable {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            records: Mutex::new(HashMap::new()),
            changes,
        }
    }

    fn lock_records(&self) -> MutexGuard<'_, HashMap<Symbol, MarketRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Market table mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Replace the record for `symbol` with fresh poll results, carrying the
    /// previously hydrated logo over. Does not signal; the poll sweep bumps
    /// once when it completes.
    pub fn merge_poll(&self, symbol: &str, quote: Quote, history: HistorySeries) {
        let mut records = self.lock_records();
        let logo = records.get(symbol).and_then(|r| r.logo.clone());
        let mut record = MarketRecord::from_poll(quote, history);
        record.logo = logo;
        records.insert(symbol.to_string(), record);
    }

    /// Apply a batch of live trades, keeping only the last tick per symbol.
    /// Ticks for symbols without a record are dropped; a record only exists
    /// once a poll has established the baseline. Signals when anything was
    /// applied. Returns the number of records updated.
    pub fn apply_trades(&self, ticks: &[TradeTick]) -> usize {
        let mut last_by_symbol: HashMap<&str, &TradeTick> = HashMap::new();
        for tick in ticks {
            last_by_symbol.insert(tick.symbol.as_str(), tick);
        }

        let applied = {
            let mut records = self.lock_records();
            let mut applied = 0;
            for (symbol, tick) in last_by_symbol {
                if let Some(record) = records.get_mut(symbol) {
                    record.apply_tick(tick.t, tick.price);
                    applied += 1;
                }
            }
            applied
        };

        if applied > 0 {
            self.bump();
        }
        applied
    }

    /// Attach or clear the logo for an existing record. Does not signal;
    /// hydration happens inside a poll sweep.
    pub fn set_logo(&self, symbol: &str, logo: Option<String>) {
        if let Some(record) = self.lock_records().get_mut(symbol) {
            record.logo = logo;
        }
    }

    /// Drop the record for `symbol`. Signals when something was removed.
    pub fn remove(&self, symbol: &str) -> bool {
        let removed = self.lock_records().remove(symbol).is_some();
        if removed {
            self.bump();
        }
        removed
    }

    pub fn get(&self, symbol: &str) -> Option<MarketRecord> {
        self.lock_records().get(symbol).cloned()
    }

    /// Clone of the full table. Display ordering is the caller's concern;
    /// the watchlist, not the table, knows the user's order.
    pub fn snapshot(&self) -> HashMap<Symbol, MarketRecord> {
        self.lock_records().clone()
    }

    pub fn len(&self) -> usize {
        self.lock_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_records().is_empty()
    }

    /// Receiver that observes the generation counter move on every signalled
    /// change. The counter value only orders changes; read data through
    /// [`MarketTable::snapshot`].
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Advance the generation counter, waking subscribers.
    pub fn bump(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, price: f64, t: i64) -> TradeTick {
        TradeTick {
            symbol: symbol.to_string(),
            price,
            t,
        }
    }

    fn usd_quote(last: f64, prev: f64) -> Quote {
        Quote::new(Some(last), Some(prev), Some(1_000), "USD")
    }

    #[test]
    fn test_merge_poll_inserts_and_replaces() {
        let table = MarketTable::new();
        table.merge_poll("AAPL", usd_quote(185.0, 184.0), HistorySeries::new());
        assert_eq!(table.get("AAPL").unwrap().quote.last, Some(185.0));

        table.merge_poll("AAPL", usd_quote(186.0, 184.0), HistorySeries::new());
        assert_eq!(table.get("AAPL").unwrap().quote.last, Some(186.0));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_merge_poll_preserves_logo() {
        let table = MarketTable::new();
        table.merge_poll("AAPL", usd_quote(185.0, 184.0), HistorySeries::new());
        table.set_logo("AAPL", Some("https://logo.clearbit.com/apple.com".to_string()));

        table.merge_poll("AAPL", usd_quote(186.0, 184.0), HistorySeries::new());
        assert_eq!(
            table.get("AAPL").unwrap().logo.as_deref(),
            Some("https://logo.clearbit.com/apple.com")
        );
    }

    #[test]
    fn test_apply_trades_last_tick_wins() {
        let table = MarketTable::new();
        table.merge_poll("BINANCE:BTCUSDT", usd_quote(42000.0, 41000.0), HistorySeries::new());

        let applied = table.apply_trades(&[
            tick("BINANCE:BTCUSDT", 42100.0, 2_000),
            tick("BINANCE:BTCUSDT", 42250.0, 3_000),
        ]);

        assert_eq!(applied, 1);
        let record = table.get("BINANCE:BTCUSDT").unwrap();
        assert_eq!(record.quote.last, Some(42250.0));
        assert_eq!(record.quote.t, Some(3_000));
    }

    #[test]
    fn test_apply_trades_drops_unknown_symbols() {
        let table = MarketTable::new();
        table.merge_poll("AAPL", usd_quote(185.0, 184.0), HistorySeries::new());

        let applied = table.apply_trades(&[
            tick("AAPL", 185.5, 2_000),
            tick("MSFT", 410.0, 2_000),
        ]);

        assert_eq!(applied, 1);
        assert!(table.get("MSFT").is_none());
    }

    #[test]
    fn test_apply_trades_signals_only_when_applied() {
        let table = MarketTable::new();
        let rx = table.subscribe_changes();
        let before = *rx.borrow();

        table.apply_trades(&[tick("UNKNOWN", 1.0, 1_000)]);
        assert_eq!(*rx.borrow(), before);

        table.merge_poll("AAPL", usd_quote(185.0, 184.0), HistorySeries::new());
        table.apply_trades(&[tick("AAPL", 185.5, 2_000)]);
        assert_eq!(*rx.borrow(), before + 1);
    }

    #[test]
    fn test_remove_signals() {
        let table = MarketTable::new();
        table.merge_poll("AAPL", usd_quote(185.0, 184.0), HistorySeries::new());
        let rx = table.subscribe_changes();
        let before = *rx.borrow();

        assert!(table.remove("AAPL"));
        assert_eq!(*rx.borrow(), before + 1);

        assert!(!table.remove("AAPL"));
        assert_eq!(*rx.borrow(), before + 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let table = MarketTable::new();
        table.merge_poll("AAPL", usd_quote(185.0, 184.0), HistorySeries::new());

        let snapshot = table.snapshot();
        table.remove("AAPL");

        assert!(snapshot.contains_key("AAPL"));
        assert!(table.is_empty());
    }
}
