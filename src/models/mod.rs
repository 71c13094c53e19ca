//! Market data models
//!
//! This module contains the core data types for the engine:
//! - `types` - Type aliases for common identifiers (Symbol, Currency)
//! - `quote` - Latest price point for a symbol (Quote)
//! - `history` - Rolling price series with bucket coalescing (HistorySeries)
//! - `record` - Per-symbol aggregate held in the market table (MarketRecord)
//! - `tick` - Streamed trade event (TradeTick)
//! - `search` - Search result data (SearchResult)
//! - `watchlist` - Watched instruments (WatchEntry, Watchlist)

mod history;
mod quote;
mod record;
mod search;
mod tick;
mod types;
mod watchlist;

pub use history::{HistoryPoint, HistorySeries, COALESCE_WINDOW_MS, HISTORY_CAP};
pub use quote::{coerce_price, Quote};
pub use record::MarketRecord;
pub use search::SearchResult;
pub use tick::TradeTick;
pub use types::{Currency, Symbol};
pub use watchlist::{InstrumentKind, WatchEntry, Watchlist};
