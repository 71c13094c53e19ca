//! Poll orchestration across providers.
//!
//! The aggregator owns the two provider adapters and drives the periodic
//! sweep: for every watched symbol it fetches quote and history from the
//! active provider concurrently, merges results into the shared
//! [`MarketTable`], keeps the USD→EUR rate fresh, and hydrates logos. Every
//! failure is classified into a [`FailureAction`](crate::errors::FailureAction)
//! that decides between staying quiet, arming the rate-limit cooldown,
//! failing over to the alternate provider, or surfacing a per-symbol notice.
//! No failure is ever fatal; a sweep always runs to completion.

pub mod cooldown;
pub mod fx;
pub mod logos;
pub mod table;

pub use cooldown::Cooldown;
pub use fx::{FxConverter, DEFAULT_USD_EUR};
pub use logos::LogoCache;
pub use table::MarketTable;

use futures_util::future::join_all;
use log::{debug, warn};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::errors::{FailureAction, MarketDataError};
use crate::models::{HistorySeries, Quote, SearchResult, Symbol};
use crate::provider::finnhub::FinnhubProvider;
use crate::provider::twelve_data::TwelveDataProvider;
use crate::provider::{MarketDataProvider, ProviderKind};
use crate::resolver::remap_regional;
use crate::store::{NotificationSink, SettingsStore, Severity, DEFAULT_DISMISS_MS};

/// Cadence of scheduled poll sweeps.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// How long scheduled sweeps stay quiet after a rate-limit response.
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);

/// What started a sweep. Scheduled sweeps respect the rate-limit cooldown;
/// manual ones always run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshTrigger {
    Manual,
    Scheduled,
}

/// Drives poll sweeps against the active provider and reconciles results
/// into the shared table.
pub struct Aggregator {
    active: ProviderKind,
    finnhub: FinnhubProvider,
    twelve_data: TwelveDataProvider,
    table: Arc<MarketTable>,
    fx: Arc<FxConverter>,
    cooldown: Arc<Cooldown>,
    logos: LogoCache,
    notifier: Arc<dyn NotificationSink>,
    client: Client,
}

impl Aggregator {
    /// Build an aggregator for the given settings. The table, FX state and
    /// cooldown are shared so they survive a settings change that rebuilds
    /// the provider adapters.
    pub fn new(
        config: &AppConfig,
        table: Arc<MarketTable>,
        fx: Arc<FxConverter>,
        cooldown: Arc<Cooldown>,
        store: Arc<dyn SettingsStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            active: config.provider,
            finnhub: FinnhubProvider::new(config.api_key.clone()),
            twelve_data: TwelveDataProvider::new(config.api_key.clone()),
            table,
            fx,
            cooldown,
            logos: LogoCache::new(store),
            notifier,
            client,
        }
    }

    /// The provider sweeps currently run against.
    pub fn active_kind(&self) -> ProviderKind {
        self.active
    }

    fn active_provider(&self) -> &dyn MarketDataProvider {
        match self.active {
            ProviderKind::Finnhub => &self.finnhub,
            ProviderKind::TwelveData => &self.twelve_data,
        }
    }

    /// Symbol search against the active provider.
    pub async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, MarketDataError> {
        self.active_provider().search(query, cancel).await
    }

    /// One full sweep: refresh the FX rate, then every symbol concurrently,
    /// then signal readers once. Scheduled sweeps are dropped while the
    /// rate-limit cooldown is armed; manual ones go through regardless.
    pub async fn refresh_all(
        &self,
        symbols: &[Symbol],
        trigger: RefreshTrigger,
        cancel: &CancellationToken,
    ) {
        if trigger == RefreshTrigger::Scheduled && self.cooldown.active() {
            debug!("Rate-limit cooldown active, skipping scheduled sweep");
            return;
        }

        self.fx.refresh(&self.client, cancel).await;
        join_all(
            symbols
                .iter()
                .map(|symbol| self.refresh_symbol(symbol, cancel)),
        )
        .await;
        self.table.bump();
    }

    /// Refresh a single symbol from the active provider and reconcile the
    /// outcome. Never returns an error; failures end up as notices, a
    /// cooldown, or a provider fallback.
    pub async fn refresh_symbol(&self, symbol: &str, cancel: &CancellationToken) {
        match fetch_pair(self.active_provider(), symbol, cancel).await {
            Ok((quote, history)) => {
                self.table.merge_poll(symbol, quote, history);
                self.hydrate_logo(symbol, cancel).await;
            }
            Err(err) => self.handle_failure(symbol, err, cancel).await,
        }
    }

    /// Attach a logo to the record if one isn't attached yet. The cache
    /// answers first; at most one profile lookup ever happens per symbol.
    async fn hydrate_logo(&self, symbol: &str, cancel: &CancellationToken) {
        if self
            .table
            .get(symbol)
            .is_some_and(|record| record.logo.is_some())
        {
            return;
        }
        if let Some(logo) = self.logos.resolve(&self.finnhub, symbol, cancel).await {
            self.table.set_logo(symbol, logo);
        }
    }

    async fn handle_failure(
        &self,
        symbol: &str,
        err: MarketDataError,
        cancel: &CancellationToken,
    ) {
        match err.failure_action() {
            FailureAction::Ignore => {}
            FailureAction::Cooldown => self.engage_cooldown(),
            FailureAction::Failover => {
                // Entitlement fallback exists for the restricted provider;
                // anywhere else the denial is just reported.
                if self.active == ProviderKind::Finnhub {
                    self.failover_symbol(symbol, cancel).await;
                } else {
                    self.report_failure(symbol, &err);
                }
            }
            FailureAction::Report => self.report_failure(symbol, &err),
        }
    }

    /// Entitlement fallback: remap regional suffixes and retry the whole
    /// quote+history pair against Twelve Data. On success the result is
    /// recorded under the symbol the user watches, not the remapped one.
    async fn failover_symbol(&self, symbol: &str, cancel: &CancellationToken) {
        let mapped = remap_regional(symbol);
        debug!(
            "Entitlement denied for {}, retrying as {} via Twelve Data",
            symbol, mapped
        );

        match fetch_pair(&self.twelve_data, &mapped, cancel).await {
            Ok((quote, history)) => {
                self.table.merge_poll(symbol, quote, history);
                self.hydrate_logo(symbol, cancel).await;
            }
            Err(err) => match err.failure_action() {
                FailureAction::Ignore => {}
                FailureAction::Cooldown => self.engage_cooldown(),
                _ => self.report_failure(symbol, &err),
            },
        }
    }

    fn engage_cooldown(&self) {
        if self.cooldown.engage(RATE_LIMIT_COOLDOWN) {
            self.notifier.notify(
                "Rate limited — pausing updates for 60s",
                Severity::Warning,
                Some(DEFAULT_DISMISS_MS),
            );
        }
    }

    fn report_failure(&self, symbol: &str, err: &MarketDataError) {
        warn!("Update failed for {}: {}", symbol, err);
        self.notifier.notify(
            &format!("Failed: {} ({})", symbol, err),
            Severity::Error,
            Some(DEFAULT_DISMISS_MS),
        );
    }
}

/// Quote and history for one symbol, fetched concurrently. Both must
/// succeed; a failed half fails the pair so a record is never half-updated.
async fn fetch_pair(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    cancel: &CancellationToken,
) -> Result<(Quote, HistorySeries), MarketDataError> {
    let (quote, history) = tokio::join!(
        provider.quote(symbol, cancel),
        provider.history(symbol, cancel)
    );
    Ok((quote?, history?))
}
