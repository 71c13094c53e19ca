//! Logo hydration with a persistent cache.
//!
//! Logos come from the Finnhub company profile regardless of which quote
//! provider is active, since the same credential unlocks both. Outcomes are
//! cached in the settings store, including "this symbol has no logo", so a
//! symbol is looked up at most once across restarts. Lookup failures are
//! not cached and will be retried on a later sweep.

use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::LOGOS_KEY;
use crate::provider::finnhub::FinnhubProvider;
use crate::store::SettingsStore;

/// Persistent symbol-to-logo cache. `Some(None)` entries record a symbol
/// known to have no logo.
pub struct LogoCache {
    store: Arc<dyn SettingsStore>,
}

impl LogoCache {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    fn load_map(&self) -> HashMap<String, Option<String>> {
        self.store
            .get(LOGOS_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn save_map(&self, map: &HashMap<String, Option<String>>) {
        if let Ok(raw) = serde_json::to_string(map) {
            self.store.set(LOGOS_KEY, &raw);
        }
    }

    /// Cached outcome for `symbol`. Outer `None` means never looked up.
    pub fn get(&self, symbol: &str) -> Option<Option<String>> {
        self.load_map().get(symbol).cloned()
    }

    /// Record a lookup outcome, including "no logo".
    pub fn put(&self, symbol: &str, logo: Option<String>) {
        let mut map = self.load_map();
        map.insert(symbol.to_string(), logo);
        self.save_map(&map);
    }

    /// Resolve the logo for `symbol`, hitting the profile endpoint on a
    /// cache miss. Returns `None` when the lookup failed and nothing should
    /// change; `Some(logo)` is the answer to apply, possibly "no logo".
    pub async fn resolve(
        &self,
        finnhub: &FinnhubProvider,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Option<Option<String>> {
        if let Some(cached) = self.get(symbol) {
            return Some(cached);
        }

        match finnhub.fetch_logo(symbol, cancel).await {
            Ok(logo) => {
                self.put(symbol, logo.clone());
                Some(logo)
            }
            Err(err) => {
                debug!("Logo lookup for {} failed: {}", symbol, err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySettingsStore;

    fn cache() -> LogoCache {
        LogoCache::new(Arc::new(MemorySettingsStore::new()))
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = cache();
        assert_eq!(cache.get("AAPL"), None);

        cache.put("AAPL", Some("https://logo.clearbit.com/apple.com".to_string()));
        assert_eq!(
            cache.get("AAPL"),
            Some(Some("https://logo.clearbit.com/apple.com".to_string()))
        );
    }

    #[test]
    fn test_absence_is_cached() {
        let cache = cache();
        cache.put("OANDA:XAU_USD", None);
        assert_eq!(cache.get("OANDA:XAU_USD"), Some(None));
    }

    #[test]
    fn test_persists_through_store() {
        let store = Arc::new(MemorySettingsStore::new());
        LogoCache::new(store.clone()).put("AAPL", None);

        // A fresh cache over the same store sees the entry.
        assert_eq!(LogoCache::new(store.clone()).get("AAPL"), Some(None));

        let raw = store.get(LOGOS_KEY).unwrap();
        assert!(raw.contains(r#""AAPL":null"#));
    }

    #[test]
    fn test_corrupt_cache_treated_as_empty() {
        let store = Arc::new(MemorySettingsStore::new());
        store.set(LOGOS_KEY, "not json");

        let cache = LogoCache::new(store);
        assert_eq!(cache.get("AAPL"), None);

        // Writing through repairs the stored state.
        cache.put("AAPL", None);
        assert_eq!(cache.get("AAPL"), Some(None));
    }

    #[tokio::test]
    async fn test_resolve_prefers_cache_over_network() {
        let cache = cache();
        cache.put("AAPL", Some("cached".to_string()));

        // Credential-less provider would fail if the network were hit.
        let finnhub = FinnhubProvider::new("");
        let token = CancellationToken::new();
        let resolved = cache.resolve(&finnhub, "AAPL", &token).await;
        assert_eq!(resolved, Some(Some("cached".to_string())));
    }

    #[tokio::test]
    async fn test_resolve_failure_is_not_cached() {
        let cache = cache();
        let finnhub = FinnhubProvider::new("");
        let token = CancellationToken::new();

        assert_eq!(cache.resolve(&finnhub, "AAPL", &token).await, None);
        assert_eq!(cache.get("AAPL"), None);
    }
}
