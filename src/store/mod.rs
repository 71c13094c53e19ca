//! Persistence and notification seams.
//!
//! The engine talks to its host through two narrow traits: a key/value
//! [`SettingsStore`] for everything that survives a restart (watchlist,
//! credentials, preferences, the logo cache) and a [`NotificationSink`]
//! for user-facing toasts. Hosts plug in whatever backs these ("local
//! storage" in a browser shell, a settings table elsewhere); the in-memory
//! implementations here back the tests and headless runs.

use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// How long a transient notification stays visible by default.
pub const DEFAULT_DISMISS_MS: u64 = 4200;

// ============================================================================
// Settings store
// ============================================================================

/// String key/value persistence. Implementations must tolerate concurrent
/// access; values are opaque to the engine (JSON where structure is needed).
pub trait SettingsStore: Send + Sync {
    /// Read a value, `None` when the key was never written.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str);
}

/// In-memory settings store.
#[derive(Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        match self.values.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Settings store mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock_values().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.lock_values().insert(key.to_string(), value.to_string());
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Outbound channel for user-facing messages. `auto_dismiss_ms` is a hint
/// for transient toasts; `None` means the message should stay up.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: &str, severity: Severity, auto_dismiss_ms: Option<u64>);
}

/// Notification sink that writes to the application log. Used headless and
/// as the default until a host installs its own sink.
#[derive(Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, message: &str, severity: Severity, _auto_dismiss_ms: Option<u64>) {
        match severity {
            Severity::Info => info!("{}", message),
            Severity::Warning => warn!("{}", message),
            Severity::Error => error!("{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemorySettingsStore::new();
        assert_eq!(store.get("ml_provider"), None);

        store.set("ml_provider", "finnhub");
        assert_eq!(store.get("ml_provider").as_deref(), Some("finnhub"));

        store.set("ml_provider", "twelvedata");
        assert_eq!(store.get("ml_provider").as_deref(), Some("twelvedata"));
    }

    #[test]
    fn test_memory_store_keys_are_independent() {
        let store = MemorySettingsStore::new();
        store.set("a", "1");
        store.set("b", "2");
        assert_eq!(store.get("a").as_deref(), Some("1"));
        assert_eq!(store.get("b").as_deref(), Some("2"));
    }

    #[test]
    fn test_log_notifier_accepts_all_severities() {
        let sink = LogNotifier;
        sink.notify("hello", Severity::Info, Some(DEFAULT_DISMISS_MS));
        sink.notify("careful", Severity::Warning, None);
        sink.notify("broken", Severity::Error, Some(DEFAULT_DISMISS_MS));
    }
}
