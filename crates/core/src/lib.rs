pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use chrono::NaiveDateTime;
use log::debug;
use models::{
    currency::Currency,
    entry::{Entry, EntryDraft},
    portfolio::PortfolioStore,
    query::{GraphQuery, Graphables},
    settings::Settings,
};
use providers::traits::QuoteSource;
use serde::Serialize;
use services::price_sync::{BatchProgress, BatchReport, BatchTask, PriceSync};
use std::path::Path;
use std::sync::Arc;
use storage::{format::HydrateReport, manager::StorageManager};
use uuid::Uuid;

use errors::CoreError;

/// Main entry point for the Tagfolio core library.
/// Holds the portfolio store and the price synchronizer that keeps it fresh.
#[must_use]
pub struct Tagfolio {
    store: PortfolioStore,
    /// `None` while a background refresh owns it.
    price_sync: Option<PriceSync>,
    /// The quote source in use, kept here so a lost synchronizer can be rebuilt.
    source: Arc<dyn QuoteSource>,
    /// The API key changed while a background refresh was running.
    source_stale: bool,
    /// Tracks whether any mutation has occurred since the last save/load.
    dirty: bool,
}

impl std::fmt::Debug for Tagfolio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tagfolio")
            .field("entries", &self.store.len())
            .field("settings", self.store.settings())
            .field("price_sync", &self.price_sync)
            .field("dirty", &self.dirty)
            .finish()
    }
}

#[derive(Serialize)]
struct Snapshot<'a> {
    settings: &'a Settings,
    price_time: NaiveDateTime,
    db_time: NaiveDateTime,
    entries: &'a [Entry],
}

impl Tagfolio {
    /// Create a brand new empty portfolio with default settings.
    pub fn create_new() -> Self {
        Self::from_store(PortfolioStore::new())
    }

    /// Wrap an existing store, quoting through Alpha Vantage with its API key.
    pub fn from_store(store: PortfolioStore) -> Self {
        let sync = PriceSync::alpha_vantage(store.settings().api_key.clone());
        Self::with_price_sync(store, sync)
    }

    /// Wrap an existing store with a custom quote source.
    pub fn with_quote_source(store: PortfolioStore, source: Box<dyn QuoteSource>) -> Self {
        Self::with_price_sync(store, PriceSync::new(source))
    }

    pub fn with_price_sync(store: PortfolioStore, sync: PriceSync) -> Self {
        Self {
            store,
            source: sync.shared_source(),
            price_sync: Some(sync),
            source_stale: false,
            dirty: false,
        }
    }

    /// Load from save-file text. Unreadable trailing data is dropped and
    /// described in the returned report.
    pub fn load_from_str(text: &str) -> (Self, HydrateReport) {
        let (store, report) = StorageManager::load_from_str(text);
        (Self::from_store(store), report)
    }

    /// Save to save-file text. Clears the unsaved-changes flag.
    pub fn save_to_string(&mut self) -> String {
        self.dirty = false;
        StorageManager::save_to_string(&self.store)
    }

    /// Load from a save file on disk. A missing file gives an empty portfolio.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<(Self, HydrateReport), CoreError> {
        let (store, report) = StorageManager::load_from_file(path)?;
        Ok((Self::from_store(store), report))
    }

    /// Save to a file on disk. Clears the unsaved-changes flag on success.
    pub fn save_to_file(&mut self, path: impl AsRef<Path>) -> Result<(), CoreError> {
        StorageManager::save_to_file(&self.store, path)?;
        self.dirty = false;
        Ok(())
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &PortfolioStore {
        &self.store
    }

    // ── Entry Management ────────────────────────────────────────────

    /// Add a fully built entry.
    pub fn create_entry(&mut self, entry: Entry) -> Uuid {
        self.dirty = true;
        self.store.create_entry(entry)
    }

    /// Validate form input and add the resulting entry.
    ///
    /// For auto-priced drafts the current price is fetched first; if none
    /// can be found nothing is added.
    pub async fn create_entry_from_draft(&mut self, draft: &EntryDraft) -> Result<Uuid, CoreError> {
        let entry = self.build_from_draft(draft).await?;
        Ok(self.create_entry(entry))
    }

    /// Validate form input and replace an existing entry with it.
    pub async fn replace_entry_from_draft(
        &mut self,
        entry_id: Uuid,
        draft: &EntryDraft,
    ) -> Result<(), CoreError> {
        let entry = self.build_from_draft(draft).await?;
        self.replace_entry(entry_id, entry)
    }

    /// Remove an entry by its ID.
    pub fn remove_entry(&mut self, entry_id: Uuid) -> Result<Entry, CoreError> {
        let removed = self.store.remove_entry(entry_id)?;
        self.dirty = true;
        Ok(removed)
    }

    /// Replace an entry, keeping its ID.
    pub fn replace_entry(&mut self, entry_id: Uuid, entry: Entry) -> Result<(), CoreError> {
        self.store.replace_entry(entry_id, entry)?;
        self.dirty = true;
        Ok(())
    }

    #[must_use]
    pub fn get_entry(&self, entry_id: Uuid) -> Option<&Entry> {
        self.store.entry(entry_id)
    }

    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        self.store.entries()
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.store.len()
    }

    // ── Tags ────────────────────────────────────────────────────────

    #[must_use]
    pub fn values_for_tag(&self, tag: &str) -> Option<Vec<&str>> {
        self.store.values_for_tag(tag)
    }

    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        self.store.tags()
    }

    #[must_use]
    pub fn max_values_per_tag(&self) -> usize {
        self.store.max_values_per_tag()
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Group, convert and sort the entries matching `query`.
    ///
    /// In auto-rate mode the exchange rate is resolved first. While a
    /// background refresh is running the stored rate is used instead.
    pub async fn find_graphables(&mut self, query: &GraphQuery) -> Result<Graphables, CoreError> {
        self.exchange_rate().await;
        self.store.find_graphables(query)
    }

    /// The exchange rate queries convert with, fetching it in auto mode.
    pub async fn exchange_rate(&mut self) -> f64 {
        match self.price_sync.as_mut() {
            Some(sync) => self.store.resolve_exchange_rate(sync).await,
            None => {
                debug!("price refresh in flight, using stored exchange rate");
                self.store.exchange_rate()
            }
        }
    }

    // ── Prices ──────────────────────────────────────────────────────

    /// Refresh every auto-priced entry, reporting progress as it goes.
    ///
    /// Runs on the caller's task. Bumps the price timestamp once done,
    /// whether or not some tickers failed.
    pub async fn refresh_prices<F>(&mut self, on_progress: F) -> Result<BatchReport, CoreError>
    where
        F: FnMut(BatchProgress),
    {
        let sync = self.price_sync.as_mut().ok_or(CoreError::RefreshInFlight)?;
        let mut entries = self.store.entries().to_vec();
        let report = sync.batch_update_prices(&mut entries, on_progress).await;
        self.store.apply_prices(&report.updates);
        self.store.mark_prices_updated();
        self.dirty = true;
        Ok(report)
    }

    /// Start a refresh on a background Tokio task.
    ///
    /// The store stays usable meanwhile; hand the task back to
    /// [`Tagfolio::finish_price_refresh`] to apply the new prices.
    pub fn start_price_refresh(&mut self) -> Result<BatchTask, CoreError> {
        let sync = self.price_sync.take().ok_or(CoreError::RefreshInFlight)?;
        Ok(sync.spawn_batch(self.store.entries().to_vec()))
    }

    /// Wait for a background refresh and apply its prices.
    ///
    /// Only successful fetches are written, and only onto entries that still
    /// hold the fetched ticker (see [`PortfolioStore::apply_prices`]). If the
    /// task died, a synchronizer over the same quote source, with empty
    /// caches, takes its place.
    pub async fn finish_price_refresh(&mut self, task: BatchTask) -> Result<BatchReport, CoreError> {
        let outcome = match task.join().await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.price_sync = Some(PriceSync::with_shared_source(Arc::clone(&self.source)));
                self.source_stale = false;
                return Err(e);
            }
        };

        let mut sync = outcome.sync;
        if self.source_stale {
            sync.set_shared_source(Arc::clone(&self.source));
            self.source_stale = false;
        }
        self.price_sync = Some(sync);

        self.store.apply_prices(&outcome.report.updates);
        self.store.mark_prices_updated();
        self.dirty = true;
        Ok(outcome.report)
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.price_sync.is_none()
    }

    /// Price cached by the synchronizer this run, if any.
    #[must_use]
    pub fn cached_price(&self, ticker: &str) -> Option<f64> {
        self.price_sync.as_ref().and_then(|s| s.cached_price(ticker))
    }

    // ── Settings ────────────────────────────────────────────────────

    #[must_use]
    pub fn get_settings(&self) -> &Settings {
        self.store.settings()
    }

    /// Set the quote-service API key.
    ///
    /// Sources that take a key are rebuilt with it so it takes effect
    /// immediately; any other source is kept unchanged.
    pub fn set_api_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        if let Some(source) = self.source.rekeyed(&key) {
            self.source = source;
            match self.price_sync.as_mut() {
                Some(sync) => sync.set_shared_source(Arc::clone(&self.source)),
                None => self.source_stale = true,
            }
        }
        self.store.set_api_key(key);
        self.dirty = true;
    }

    /// Set the display currency (e.g., "CAD", "USD").
    pub fn set_graph_currency(&mut self, code: &str) -> Result<(), CoreError> {
        let currency = Currency::new(code)?;
        self.store.set_graph_currency(currency);
        self.dirty = true;
        Ok(())
    }

    /// Set the manual exchange rate. Returns `Ok(false)` when auto-rate mode
    /// is on and the value was ignored.
    pub fn set_exchange_rate(&mut self, rate: f64) -> Result<bool, CoreError> {
        let applied = self.store.set_exchange_rate(rate)?;
        if applied {
            self.dirty = true;
        }
        Ok(applied)
    }

    /// Flip auto-rate mode; returns the new state.
    pub fn toggle_auto_rate(&mut self) -> bool {
        self.dirty = true;
        self.store.toggle_auto_rate()
    }

    // ── Misc ────────────────────────────────────────────────────────

    /// Returns `true` if the portfolio has been modified since the last save or load.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn dates_label(&self) -> String {
        self.store.dates_label()
    }

    /// Export settings, timestamps and entries as JSON (debugging/display).
    pub fn to_json(&self) -> Result<String, CoreError> {
        let snapshot = Snapshot {
            settings: self.store.settings(),
            price_time: self.store.price_time(),
            db_time: self.store.db_time(),
            entries: self.store.entries(),
        };
        serde_json::to_string_pretty(&snapshot)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize portfolio: {e}")))
    }

    // ── Internal ────────────────────────────────────────────────────

    async fn build_from_draft(&mut self, draft: &EntryDraft) -> Result<Entry, CoreError> {
        let mut entry = draft.build()?;
        if entry.update_price() {
            let sync = self.price_sync.as_mut().ok_or(CoreError::RefreshInFlight)?;
            let price = sync.fetch_price(entry.ticker()).await.map_err(|e| {
                debug!("draft price lookup failed: {e}");
                CoreError::InvalidInput(format!(
                    "Could not find a price for the ticker {}.",
                    entry.ticker()
                ))
            })?;
            entry.set_price(price);
        }
        Ok(entry)
    }
}
