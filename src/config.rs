//! Application configuration persisted through the settings store.
//!
//! The stored keys mirror what the original dashboard kept in browser
//! local storage, so a host wrapping real local storage picks up existing
//! user state unchanged.

use crate::models::Watchlist;
use crate::provider::ProviderKind;
use crate::store::SettingsStore;

/// Active quote provider ("finnhub" or "twelvedata").
pub const PROVIDER_KEY: &str = "ml_provider";
/// The shared REST/streaming API key.
pub const API_KEY_KEY: &str = "ml_api_key";
/// "true" when USD prices should be displayed in EUR. On by default.
pub const EUR_KEY: &str = "ml_eur";
/// Board layout, "grid" or "list".
pub const VIEW_KEY: &str = "ml_view";
/// JSON array of watchlist entries.
pub const WATCHLIST_KEY: &str = "ml_watch";
/// JSON map of symbol to cached logo URL (null for "known absent").
pub const LOGOS_KEY: &str = "ml_logos";

/// Board layout preference. Opaque to the engine; persisted on behalf of
/// the rendering surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Grid => "grid",
            ViewMode::List => "list",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "list" => ViewMode::List,
            _ => ViewMode::Grid,
        }
    }
}

/// User-controlled runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub provider: ProviderKind,
    pub api_key: String,
    pub prefer_eur: bool,
    pub view_mode: ViewMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            api_key: String::new(),
            prefer_eur: true,
            view_mode: ViewMode::default(),
        }
    }
}

impl AppConfig {
    /// Load settings from the store, applying defaults for anything unset.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let provider = store
            .get(PROVIDER_KEY)
            .and_then(|raw| ProviderKind::parse(&raw))
            .unwrap_or_default();
        let api_key = store.get(API_KEY_KEY).unwrap_or_default();
        // EUR preference defaults to on and is stored as a JSON boolean.
        let prefer_eur = store
            .get(EUR_KEY)
            .map(|raw| raw != "false")
            .unwrap_or(true);
        let view_mode = store
            .get(VIEW_KEY)
            .map(|raw| ViewMode::parse(&raw))
            .unwrap_or_default();

        Self {
            provider,
            api_key,
            prefer_eur,
            view_mode,
        }
    }

    /// Persist all settings back to the store.
    pub fn save(&self, store: &dyn SettingsStore) {
        store.set(PROVIDER_KEY, self.provider.as_str());
        store.set(API_KEY_KEY, &self.api_key);
        store.set(EUR_KEY, if self.prefer_eur { "true" } else { "false" });
        store.set(VIEW_KEY, self.view_mode.as_str());
    }
}

/// Load the persisted watchlist. Absent or unreadable state yields `None`
/// so the caller can seed the starter list.
pub fn load_watchlist(store: &dyn SettingsStore) -> Option<Watchlist> {
    let raw = store.get(WATCHLIST_KEY)?;
    serde_json::from_str(&raw).ok()
}

/// Persist the watchlist as JSON.
pub fn save_watchlist(store: &dyn SettingsStore, watchlist: &Watchlist) {
    if let Ok(raw) = serde_json::to_string(watchlist) {
        store.set(WATCHLIST_KEY, &raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySettingsStore;

    #[test]
    fn test_defaults_when_store_is_empty() {
        let store = MemorySettingsStore::new();
        let config = AppConfig::load(&store);

        assert_eq!(config.provider, ProviderKind::Finnhub);
        assert_eq!(config.api_key, "");
        assert!(config.prefer_eur);
        assert_eq!(config.view_mode, ViewMode::Grid);
    }

    #[test]
    fn test_save_load_round_trip() {
        let store = MemorySettingsStore::new();
        let config = AppConfig {
            provider: ProviderKind::TwelveData,
            api_key: "secret".to_string(),
            prefer_eur: false,
            view_mode: ViewMode::List,
        };
        config.save(&store);

        assert_eq!(AppConfig::load(&store), config);
        assert_eq!(store.get(PROVIDER_KEY).as_deref(), Some("twelvedata"));
        assert_eq!(store.get(EUR_KEY).as_deref(), Some("false"));
        assert_eq!(store.get(VIEW_KEY).as_deref(), Some("list"));
    }

    #[test]
    fn test_unknown_provider_falls_back_to_default() {
        let store = MemorySettingsStore::new();
        store.set(PROVIDER_KEY, "bloomberg");
        let config = AppConfig::load(&store);
        assert_eq!(config.provider, ProviderKind::Finnhub);
    }

    #[test]
    fn test_eur_preference_only_disabled_explicitly() {
        let store = MemorySettingsStore::new();
        store.set(EUR_KEY, "true");
        assert!(AppConfig::load(&store).prefer_eur);

        store.set(EUR_KEY, "false");
        assert!(!AppConfig::load(&store).prefer_eur);
    }

    #[test]
    fn test_watchlist_round_trip() {
        let store = MemorySettingsStore::new();
        assert!(load_watchlist(&store).is_none());

        let watchlist = Watchlist::starter("OANDA:XAU_USD");
        save_watchlist(&store, &watchlist);

        let loaded = load_watchlist(&store).unwrap();
        assert_eq!(
            loaded.symbols().collect::<Vec<_>>(),
            watchlist.symbols().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_corrupt_watchlist_is_ignored() {
        let store = MemorySettingsStore::new();
        store.set(WATCHLIST_KEY, "not json");
        assert!(load_watchlist(&store).is_none());
    }
}
