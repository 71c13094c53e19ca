//! Engine wiring together watchlist, poll sweeps, and the live feed.
//!
//! [`MarketEngine`] is the single entry point a host embeds: it loads the
//! persisted settings and watchlist (seeding a starter list on first run),
//! runs the 30-second poll scheduler, keeps the websocket feed subscribed
//! to exactly the watched symbols while the active provider supports
//! streaming, and applies user actions (add/remove symbol, settings
//! changes, searches). All state a renderer needs comes out of
//! [`MarketEngine::snapshot`]; change signalling runs through the table's
//! generation counter.

use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::aggregator::{Aggregator, Cooldown, FxConverter, MarketTable, RefreshTrigger, REFRESH_INTERVAL};
use crate::config::{self, AppConfig, ViewMode};
use crate::errors::MarketDataError;
use crate::models::{Currency, MarketRecord, SearchResult, Symbol, WatchEntry, Watchlist};
use crate::provider::ProviderKind;
use crate::store::{NotificationSink, SettingsStore, Severity, DEFAULT_DISMISS_MS};
use crate::stream::{FeedHandle, FeedState, LiveFeed};

/// Quiet window between a search call and the request actually going out.
/// A newer search within the window supersedes the older one.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(200);

/// Mutable engine state behind one lock: the bits that change together
/// when settings or the watchlist change.
struct EngineCore {
    config: AppConfig,
    watchlist: Watchlist,
    aggregator: Arc<Aggregator>,
    feed: Option<FeedHandle>,
    feed_cancel: CancellationToken,
}

/// Top-level market data engine.
pub struct MarketEngine {
    store: Arc<dyn SettingsStore>,
    notifier: Arc<dyn NotificationSink>,
    table: Arc<MarketTable>,
    fx: Arc<FxConverter>,
    cooldown: Arc<Cooldown>,
    core: Arc<RwLock<EngineCore>>,
    search_gate: Mutex<CancellationToken>,
    shutdown: CancellationToken,
}

impl MarketEngine {
    /// Build an engine over the given persistence and notification hosts.
    /// First run (no stored watchlist) seeds the starter list with the
    /// active provider's gold convention.
    pub fn new(store: Arc<dyn SettingsStore>, notifier: Arc<dyn NotificationSink>) -> Arc<Self> {
        let config = AppConfig::load(store.as_ref());

        let watchlist = match config::load_watchlist(store.as_ref()) {
            Some(list) if !list.is_empty() => list,
            _ => {
                let starter = Watchlist::starter(config.provider.gold_symbol());
                config::save_watchlist(store.as_ref(), &starter);
                starter
            }
        };

        let table = Arc::new(MarketTable::new());
        let fx = Arc::new(FxConverter::new());
        let cooldown = Arc::new(Cooldown::new());
        let shutdown = CancellationToken::new();

        let aggregator = Arc::new(Aggregator::new(
            &config,
            table.clone(),
            fx.clone(),
            cooldown.clone(),
            store.clone(),
            notifier.clone(),
        ));

        Arc::new(Self {
            store,
            notifier,
            table,
            fx,
            cooldown,
            core: Arc::new(RwLock::new(EngineCore {
                config,
                watchlist,
                aggregator,
                feed: None,
                feed_cancel: shutdown.child_token(),
            })),
            search_gate: Mutex::new(CancellationToken::new()),
            shutdown,
        })
    }

    /// Run the initial sweep, bring up the live feed, and start the poll
    /// scheduler. Returns once the initial sweep has completed; the
    /// scheduler and feed keep running until [`MarketEngine::stop`].
    pub async fn start(&self) {
        self.refresh(RefreshTrigger::Manual).await;
        self.ensure_feed().await;

        let core = self.core.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REFRESH_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The immediate first tick duplicates the initial sweep.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        run_sweep(&core, &shutdown, RefreshTrigger::Scheduled).await;
                    }
                }
            }
            debug!("Poll scheduler stopped");
        });
    }

    /// Stop the scheduler, the live feed, and any in-flight requests.
    pub fn stop(&self) {
        info!("Market engine shutting down");
        self.shutdown.cancel();
    }

    // ------------------------------------------------------------------
    // Sweeps
    // ------------------------------------------------------------------

    /// Run one sweep over the current watchlist.
    pub async fn refresh(&self, trigger: RefreshTrigger) {
        run_sweep(&self.core, &self.shutdown, trigger).await;
    }

    /// Fire a manual sweep without waiting for it.
    fn kick_refresh(&self) {
        let core = self.core.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            run_sweep(&core, &shutdown, RefreshTrigger::Manual).await;
        });
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Debounced symbol search against the active provider. Calling again
    /// within the debounce window (or while a previous search is still in
    /// flight) cancels the earlier call, which returns
    /// [`MarketDataError::Cancelled`].
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, MarketDataError> {
        let token = {
            let mut gate = self.lock_search_gate();
            gate.cancel();
            let token = self.shutdown.child_token();
            *gate = token.clone();
            token
        };

        tokio::select! {
            _ = token.cancelled() => return Err(MarketDataError::Cancelled),
            _ = tokio::time::sleep(SEARCH_DEBOUNCE) => {}
        }

        let aggregator = self.core.read().await.aggregator.clone();
        aggregator.search(query, &token).await
    }

    fn lock_search_gate(&self) -> MutexGuard<'_, CancellationToken> {
        match self.search_gate.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ------------------------------------------------------------------
    // Watchlist
    // ------------------------------------------------------------------

    /// Add an entry to the top of the watchlist. Subscribes it on the live
    /// feed and kicks off a sweep so the tile fills in. Returns false (and
    /// does nothing) when the symbol is already watched.
    pub async fn add_symbol(&self, entry: WatchEntry) -> bool {
        let added = {
            let mut core = self.core.write().await;
            let symbol = entry.symbol.clone();
            let added = core.watchlist.add(entry);
            if added {
                config::save_watchlist(self.store.as_ref(), &core.watchlist);
                if let Some(feed) = &core.feed {
                    feed.subscribe(symbol);
                }
            }
            added
        };

        if added {
            self.kick_refresh();
        }
        added
    }

    /// Remove a symbol from the watchlist, its record from the table, and
    /// its subscription from the live feed.
    pub async fn remove_symbol(&self, symbol: &str) -> bool {
        let mut core = self.core.write().await;
        if core.watchlist.remove(symbol).is_none() {
            return false;
        }
        config::save_watchlist(self.store.as_ref(), &core.watchlist);
        if let Some(feed) = &core.feed {
            feed.unsubscribe(symbol.to_string());
        }
        self.table.remove(symbol);
        true
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Apply a settings-dialog save: provider and credential together.
    /// Rebuilds the provider adapters, re-resolves the gold watchlist entry
    /// to the new provider's convention, restarts or stops the live feed as
    /// needed, and sweeps the watchlist.
    pub async fn update_settings(&self, provider: ProviderKind, api_key: String) {
        let (old, watch_empty) = {
            let mut core = self.core.write().await;
            let old = core.config.clone();
            core.config.provider = provider;
            core.config.api_key = api_key;
            core.config.save(self.store.as_ref());

            if old.provider != provider {
                let old_gold = old.provider.gold_symbol();
                let new_gold = provider.gold_symbol();
                if core.watchlist.replace_symbol(old_gold, new_gold) {
                    config::save_watchlist(self.store.as_ref(), &core.watchlist);
                    self.table.remove(old_gold);
                }
            }

            core.aggregator = Arc::new(Aggregator::new(
                &core.config,
                self.table.clone(),
                self.fx.clone(),
                self.cooldown.clone(),
                self.store.clone(),
                self.notifier.clone(),
            ));
            (old, core.watchlist.is_empty())
        };

        self.notifier.notify(
            &format!("Saved provider: {}", provider.display_name()),
            Severity::Info,
            Some(DEFAULT_DISMISS_MS),
        );

        let core_changed = {
            let core = self.core.read().await;
            old.provider != core.config.provider || old.api_key != core.config.api_key
        };
        if core_changed {
            self.ensure_feed().await;
        }
        if !watch_empty {
            self.kick_refresh();
        }
    }

    /// Toggle EUR display preference. Readers are signalled so the board
    /// re-renders with converted prices.
    pub async fn set_prefer_eur(&self, prefer_eur: bool) {
        let mut core = self.core.write().await;
        core.config.prefer_eur = prefer_eur;
        core.config.save(self.store.as_ref());
        drop(core);
        self.table.bump();
    }

    /// Persist the board layout choice on behalf of the renderer.
    pub async fn set_view_mode(&self, view_mode: ViewMode) {
        let mut core = self.core.write().await;
        core.config.view_mode = view_mode;
        core.config.save(self.store.as_ref());
        drop(core);
        self.table.bump();
    }

    // ------------------------------------------------------------------
    // Live feed
    // ------------------------------------------------------------------

    /// Stop any running feed and start a fresh one when the active
    /// provider streams and a credential is present.
    async fn ensure_feed(&self) {
        let mut core = self.core.write().await;
        core.feed_cancel.cancel();
        core.feed = None;

        if !wants_feed(&core.config) {
            debug!("Live feed not applicable for current settings");
            return;
        }

        let symbols: Vec<Symbol> = core.watchlist.symbols().map(String::from).collect();
        let (ticks_tx, mut ticks_rx) = mpsc::unbounded_channel();
        let feed_cancel = self.shutdown.child_token();
        let (feed, handle) = LiveFeed::new(
            &core.config.api_key,
            symbols,
            ticks_tx,
            feed_cancel.clone(),
        );
        core.feed = Some(handle);
        core.feed_cancel = feed_cancel;

        tokio::spawn(feed.run());

        let table = self.table.clone();
        tokio::spawn(async move {
            while let Some(batch) = ticks_rx.recv().await {
                table.apply_trades(&batch);
            }
        });
    }

    /// Connection state of the live feed, `None` when no feed is running.
    pub async fn live_feed_state(&self) -> Option<FeedState> {
        self.core.read().await.feed.as_ref().map(|f| f.state())
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    /// Watchlist entries in display order, each with its record if a poll
    /// or tick has produced one.
    pub async fn snapshot(&self) -> Vec<(WatchEntry, Option<MarketRecord>)> {
        let core = self.core.read().await;
        let records = self.table.snapshot();
        core.watchlist
            .entries()
            .iter()
            .map(|entry| (entry.clone(), records.get(&entry.symbol).cloned()))
            .collect()
    }

    /// Receiver that wakes after every mutation cycle (sweep, trade batch,
    /// removal, display-preference change).
    pub fn subscribe_changes(&self) -> tokio::sync::watch::Receiver<u64> {
        self.table.subscribe_changes()
    }

    /// Current settings.
    pub async fn config(&self) -> AppConfig {
        self.core.read().await.config.clone()
    }

    /// Convert a price for display according to the EUR preference and the
    /// current USD→EUR rate.
    pub async fn convert_for_display(&self, price: f64, ccy: &str) -> (f64, Currency) {
        let prefer_eur = self.core.read().await.config.prefer_eur;
        self.fx.convert(price, ccy, prefer_eur)
    }
}

/// One sweep over the watchlist as it stands when the sweep begins.
async fn run_sweep(
    core: &RwLock<EngineCore>,
    shutdown: &CancellationToken,
    trigger: RefreshTrigger,
) {
    let (aggregator, symbols) = {
        let core = core.read().await;
        let symbols: Vec<Symbol> = core.watchlist.symbols().map(String::from).collect();
        (core.aggregator.clone(), symbols)
    };
    aggregator.refresh_all(&symbols, trigger, shutdown).await;
}

/// Whether the current settings call for a live feed: the active provider
/// must stream and a credential must be present.
fn wants_feed(config: &AppConfig) -> bool {
    config.provider.streams() && !config.api_key.is_empty()
}
