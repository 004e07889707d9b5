use chrono::NaiveDateTime;
use log::{debug, warn};
use uuid::Uuid;

use crate::errors::CoreError;
use crate::services::graph_service::GraphService;
use crate::services::price_sync::{PriceSync, PriceUpdate};

use super::currency::Currency;
use super::entry::Entry;
use super::query::{GraphQuery, Graphables};
use super::settings::Settings;
use super::tag_index::TagIndex;

/// Owns the entry list, the tag index derived from it, the settings and the
/// two modification timestamps.
///
/// Entries only enter or leave through this type, so the index never drifts
/// from the list. `db_time` moves on every structural change; `price_time`
/// only when a batch price refresh completes.
#[derive(Debug, Clone)]
pub struct PortfolioStore {
    entries: Vec<Entry>,
    tag_index: TagIndex,
    settings: Settings,
    price_time: NaiveDateTime,
    db_time: NaiveDateTime,
}

impl Default for PortfolioStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PortfolioStore {
    /// Empty store with default settings; both timestamps set to now.
    pub fn new() -> Self {
        let now = local_now();
        Self {
            entries: Vec::new(),
            tag_index: TagIndex::new(),
            settings: Settings::default(),
            price_time: now,
            db_time: now,
        }
    }

    // ── Entries ─────────────────────────────────────────────────────

    /// Append an entry. Returns its id.
    pub fn create_entry(&mut self, entry: Entry) -> Uuid {
        let id = self.load_entry(entry);
        self.touch_db();
        id
    }

    /// Remove an entry by id and return it.
    pub fn remove_entry(&mut self, id: Uuid) -> Result<Entry, CoreError> {
        let idx = self.position(id)?;
        self.tag_index.remove_entry(self.entries[idx].tags())?;
        let removed = self.entries.remove(idx);
        self.touch_db();
        Ok(removed)
    }

    /// Replace an entry in place, keeping its id and list position.
    pub fn replace_entry(&mut self, id: Uuid, mut entry: Entry) -> Result<(), CoreError> {
        let idx = self.position(id)?;
        self.tag_index.remove_entry(self.entries[idx].tags())?;
        self.tag_index.add_entry(entry.tags());
        entry.set_id(id);
        self.entries[idx] = entry;
        self.touch_db();
        Ok(())
    }

    /// Write back prices fetched for a snapshot of this store's entries.
    ///
    /// An update lands only on the live entry with the same id that still
    /// holds the same ticker and is still auto-priced. Entries removed,
    /// re-pointed at another ticker or switched to a fixed price in the
    /// meantime are skipped. Returns how many prices were written.
    pub fn apply_prices(&mut self, updates: &[PriceUpdate]) -> usize {
        let mut applied = 0;
        for update in updates {
            let live = self.entries.iter_mut().find(|e| {
                e.id() == update.id && e.ticker() == update.ticker && e.update_price()
            });
            match live {
                Some(entry) => {
                    entry.set_price(update.price);
                    applied += 1;
                }
                None => debug!("skipping stale price for {} ({})", update.ticker, update.id),
            }
        }
        applied
    }

    /// Record that a batch price refresh just completed.
    pub fn mark_prices_updated(&mut self) {
        self.price_time = local_now();
    }

    /// Add an entry without touching `db_time` (used while hydrating).
    pub(crate) fn load_entry(&mut self, entry: Entry) -> Uuid {
        let id = entry.id();
        self.tag_index.add_entry(entry.tags());
        self.entries.push(entry);
        id
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, id: Uuid) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ── Tags ────────────────────────────────────────────────────────

    pub fn tag_index(&self) -> &TagIndex {
        &self.tag_index
    }

    /// Values in use for `tag`; `None` when no entry carries the tag.
    pub fn values_for_tag(&self, tag: &str) -> Option<Vec<&str>> {
        self.tag_index.values_for_tag(tag)
    }

    pub fn tags(&self) -> Vec<&str> {
        self.tag_index.tags()
    }

    pub fn max_values_per_tag(&self) -> usize {
        self.tag_index.max_values_per_tag()
    }

    // ── Settings ────────────────────────────────────────────────────

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn set_api_key(&mut self, key: impl Into<String>) {
        self.settings.api_key = key.into();
    }

    pub fn set_graph_currency(&mut self, currency: Currency) {
        self.settings.graph_currency = currency;
    }

    /// Set the manual exchange rate.
    ///
    /// Ignored while auto-rate mode is on: returns `Ok(false)` and keeps the
    /// stored rate. Non-positive or non-finite rates are rejected.
    pub fn set_exchange_rate(&mut self, rate: f64) -> Result<bool, CoreError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "Exchange rate must be a positive number, got {rate}"
            )));
        }
        if self.settings.auto_rate {
            return Ok(false);
        }
        self.settings.exchange_rate = rate;
        Ok(true)
    }

    pub fn set_auto_rate(&mut self, auto_rate: bool) {
        self.settings.auto_rate = auto_rate;
    }

    /// Flip auto-rate mode; returns the new state.
    pub fn toggle_auto_rate(&mut self) -> bool {
        self.settings.auto_rate = !self.settings.auto_rate;
        self.settings.auto_rate
    }

    /// The stored rate, without any remote lookup.
    pub fn exchange_rate(&self) -> f64 {
        self.settings.exchange_rate
    }

    /// The exchange rate to convert with.
    ///
    /// In auto mode the rate is fetched (or taken from the sync cache) and
    /// stored, so turning auto mode off later keeps the last known value. A
    /// failed fetch leaves the stored rate in place. In manual mode the
    /// stored rate is returned unchanged.
    pub async fn resolve_exchange_rate(&mut self, sync: &mut PriceSync) -> f64 {
        if !self.settings.auto_rate {
            return self.settings.exchange_rate;
        }

        let base = self.settings.rate_base.clone();
        let quote = self.settings.rate_quote.clone();
        match sync.fetch_exchange_rate(&base, &quote).await {
            Ok(rate) => self.settings.exchange_rate = rate,
            Err(e) => warn!(
                "could not resolve {base}->{quote} rate, keeping {}: {e}",
                self.settings.exchange_rate
            ),
        }
        self.settings.exchange_rate
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Sum entry values matching `query`, grouped by its axis and expressed
    /// in the graph currency using the stored exchange rate.
    pub fn find_graphables(&self, query: &GraphQuery) -> Result<Graphables, CoreError> {
        GraphService::new().find_graphables(
            &self.entries,
            query,
            &self.settings.graph_currency,
            &self.settings.stored_rate(),
        )
    }

    // ── Timestamps ──────────────────────────────────────────────────

    pub fn price_time(&self) -> NaiveDateTime {
        self.price_time
    }

    pub fn db_time(&self) -> NaiveDateTime {
        self.db_time
    }

    pub(crate) fn set_times(&mut self, price_time: Option<NaiveDateTime>, db_time: Option<NaiveDateTime>) {
        if let Some(t) = price_time {
            self.price_time = t;
        }
        if let Some(t) = db_time {
            self.db_time = t;
        }
    }

    /// "Database last modified <db>; prices last updated <price>"
    pub fn dates_label(&self) -> String {
        const DISPLAY: &str = "%Y-%m-%d %H:%M";
        format!(
            "Database last modified {}; prices last updated {}",
            self.db_time.format(DISPLAY),
            self.price_time.format(DISPLAY)
        )
    }

    // ── Internal ────────────────────────────────────────────────────

    fn position(&self, id: Uuid) -> Result<usize, CoreError> {
        self.entries
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| CoreError::EntryNotFound(id.to_string()))
    }

    fn touch_db(&mut self) {
        self.db_time = local_now();
    }
}

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
