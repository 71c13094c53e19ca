use serde::{Deserialize, Serialize};

use super::history::HistorySeries;
use super::quote::{coerce_price, Quote};

/// Per-symbol aggregate held in the market table.
///
/// Created or replaced wholesale by each successful poll cycle for the
/// symbol; mutated incrementally by live ticks between polls. Auxiliary
/// metadata (the logo) survives poll replacement.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MarketRecord {
    /// Latest quote fields
    #[serde(flatten)]
    pub quote: Quote,

    /// Rolling price history for the sparkline
    pub history: HistorySeries,

    /// Cached logo URL, hydrated at most once per symbol
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

impl MarketRecord {
    /// Assemble a record from one completed poll (quote and history both
    /// fetched). The logo is attached separately so a poll never clears it.
    pub fn from_poll(quote: Quote, history: HistorySeries) -> Self {
        Self {
            quote,
            history,
            logo: None,
        }
    }

    /// Apply one live trade tick: overwrite `last` and `t`, leave
    /// `prev_close` untouched, and merge the tick into the rolling history.
    /// Tick prices pass the same non-negative-finite gate as polled ones.
    pub fn apply_tick(&mut self, t: i64, p: f64) {
        let Some(p) = coerce_price(Some(p)) else {
            return;
        };
        self.quote.last = Some(p);
        self.quote.t = Some(t);
        self.history.merge_tick(t, p);
    }

    /// Percent change derived from the current quote fields.
    pub fn percent_change(&self) -> Option<f64> {
        self.quote.percent_change()
    }
}
