/// Canonical instrument identifier as entered by the user or returned by
/// search. Also the watchlist and market-table key.
pub type Symbol = String;

/// Currency code (ISO 4217), uppercased on ingest.
pub type Currency = String;
