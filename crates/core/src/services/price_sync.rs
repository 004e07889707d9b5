use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::{CoreError, FetchError};
use crate::models::currency::{Currency, ExchangeRate};
use crate::models::entry::Entry;
use crate::providers::alphavantage::AlphaVantageSource;
use crate::providers::traits::QuoteSource;

/// Progress of a batch price update.
///
/// A batch over N entries emits `Examining` for index 0..N (including
/// entries with a fixed price) and then exactly one `Done { total: N }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchProgress {
    Examining {
        index: usize,
        total: usize,
        ticker: String,
    },
    Done {
        total: usize,
    },
}

impl BatchProgress {
    /// Number of entries finished when this notification was sent.
    pub fn completed(&self) -> usize {
        match self {
            BatchProgress::Examining { index, .. } => *index,
            BatchProgress::Done { total } => *total,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, BatchProgress::Done { .. })
    }
}

/// A ticker whose price could not be refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerFailure {
    pub ticker: String,
    pub error: FetchError,
}

/// A price written onto one entry after a successful fetch of its ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub id: Uuid,
    pub ticker: String,
    pub price: f64,
}

/// Result of a batch price update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Entries looked at (the whole list).
    pub examined: usize,
    /// Entries whose price was written.
    pub updated: usize,
    /// One record per written price, in list order.
    pub updates: Vec<PriceUpdate>,
    /// Failing tickers, each listed once, in first-seen order.
    pub failures: Vec<TickerFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_tickers(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.ticker.as_str()).collect()
    }
}

/// Everything a background batch hands back when it finishes.
///
/// The batch ran on a snapshot, so only `report.updates` carries prices
/// worth writing back.
pub struct BatchOutcome {
    pub sync: PriceSync,
    pub report: BatchReport,
}

/// Handle to a batch running on a Tokio task.
///
/// Progress can be read from `progress` or ignored entirely; dropping the
/// receiver doesn't affect the batch, and the outcome always comes back
/// through [`BatchTask::join`].
pub struct BatchTask {
    pub progress: mpsc::UnboundedReceiver<BatchProgress>,
    handle: JoinHandle<BatchOutcome>,
}

impl BatchTask {
    pub async fn join(self) -> Result<BatchOutcome, CoreError> {
        self.handle
            .await
            .map_err(|e| CoreError::Worker(e.to_string()))
    }
}

/// Resolves current prices and the exchange rate from a [`QuoteSource`].
///
/// Cache strategy:
/// - **Prices**: ticker → last successfully parsed price, kept for the
///   lifetime of this value. Failed fetches are never cached.
/// - **Exchange rate**: the last successful rate for one currency pair.
///
/// Batches take `&mut self`, so at most one runs against a given instance.
pub struct PriceSync {
    source: Arc<dyn QuoteSource>,
    prices: HashMap<String, f64>,
    rate: Option<ExchangeRate>,
}

impl PriceSync {
    pub fn new(source: Box<dyn QuoteSource>) -> Self {
        Self::with_shared_source(Arc::from(source))
    }

    pub fn with_shared_source(source: Arc<dyn QuoteSource>) -> Self {
        Self {
            source,
            prices: HashMap::new(),
            rate: None,
        }
    }

    pub fn alpha_vantage(api_key: impl Into<String>) -> Self {
        Self::new(Box::new(AlphaVantageSource::new(api_key)))
    }

    /// Swap the quote source, keeping both caches.
    pub fn set_source(&mut self, source: Box<dyn QuoteSource>) {
        self.source = Arc::from(source);
    }

    pub fn set_shared_source(&mut self, source: Arc<dyn QuoteSource>) {
        self.source = source;
    }

    /// Handle to the current quote source.
    pub fn shared_source(&self) -> Arc<dyn QuoteSource> {
        Arc::clone(&self.source)
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn cached_price(&self, ticker: &str) -> Option<f64> {
        self.prices.get(ticker).copied()
    }

    pub fn cached_rate(&self) -> Option<&ExchangeRate> {
        self.rate.as_ref()
    }

    pub fn cached_price_count(&self) -> usize {
        self.prices.len()
    }

    /// Current price of `ticker`, from cache when available.
    pub async fn fetch_price(&mut self, ticker: &str) -> Result<f64, FetchError> {
        if let Some(price) = self.prices.get(ticker) {
            debug!("price cache hit for {ticker}: {price}");
            return Ok(*price);
        }

        let price = self.source.fetch_price(ticker).await?;
        if !price.is_finite() || price < 0.0 {
            return Err(FetchError::unparseable(
                self.source.name(),
                format!("Invalid price returned for {ticker}: {price} (must be finite and non-negative)"),
            ));
        }

        debug!("fetched {ticker} at {price} from {}", self.source.name());
        self.prices.insert(ticker.to_string(), price);
        Ok(price)
    }

    /// Units of `quote` per one unit of `base`, from cache when available.
    pub async fn fetch_exchange_rate(
        &mut self,
        base: &Currency,
        quote: &Currency,
    ) -> Result<f64, FetchError> {
        if let Some(cached) = &self.rate {
            if cached.base == *base && cached.quote == *quote {
                return Ok(cached.rate);
            }
        }

        let rate = self.source.fetch_exchange_rate(base, quote).await?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(FetchError::unparseable(
                self.source.name(),
                format!("Invalid exchange rate returned for {base}->{quote}: {rate}"),
            ));
        }

        debug!("fetched {base}->{quote} rate {rate}");
        self.rate = Some(ExchangeRate::new(base.clone(), quote.clone(), rate));
        Ok(rate)
    }

    /// Refresh the price of every entry flagged for automatic updates.
    ///
    /// Fetches are sequential. A ticker is requested at most once per batch,
    /// even when it failed; entries with a fixed price are left untouched.
    /// Individual failures never stop the batch.
    pub async fn batch_update_prices<F>(&mut self, entries: &mut [Entry], mut on_progress: F) -> BatchReport
    where
        F: FnMut(BatchProgress),
    {
        let total = entries.len();
        let mut report = BatchReport {
            examined: total,
            ..BatchReport::default()
        };
        let mut seen: HashMap<String, Option<f64>> = HashMap::new();

        for (index, entry) in entries.iter_mut().enumerate() {
            on_progress(BatchProgress::Examining {
                index,
                total,
                ticker: entry.ticker().to_string(),
            });

            if !entry.update_price() {
                continue;
            }

            let ticker = entry.ticker().to_string();
            let price = match seen.get(&ticker).copied() {
                Some(known) => known,
                None => {
                    let result = self.fetch_price(&ticker).await;
                    let known = match result {
                        Ok(price) => Some(price),
                        Err(error) => {
                            warn!("price update failed for {ticker}: {error}");
                            report.failures.push(TickerFailure {
                                ticker: ticker.clone(),
                                error,
                            });
                            None
                        }
                    };
                    seen.insert(ticker, known);
                    known
                }
            };

            if let Some(price) = price {
                entry.set_price(price);
                report.updated += 1;
                report.updates.push(PriceUpdate {
                    id: entry.id(),
                    ticker: entry.ticker().to_string(),
                    price,
                });
            }
        }

        on_progress(BatchProgress::Done { total });
        info!(
            "price batch finished: {} examined, {} updated, {} failed",
            report.examined,
            report.updated,
            report.failures.len()
        );
        report
    }

    /// Run [`PriceSync::batch_update_prices`] on a Tokio task.
    ///
    /// Takes ownership of the instance and a snapshot of the entries. The
    /// instance comes back in the [`BatchOutcome`] together with the report.
    /// Must be called from within a Tokio runtime.
    pub fn spawn_batch(mut self, mut entries: Vec<Entry>) -> BatchTask {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            let report = self
                .batch_update_prices(&mut entries, |progress| {
                    // The receiver may be gone already; the outcome still returns.
                    let _ = tx.send(progress);
                })
                .await;
            BatchOutcome { sync: self, report }
        });
        BatchTask {
            progress: rx,
            handle,
        }
    }
}

impl std::fmt::Debug for PriceSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceSync")
            .field("source", &self.source.name())
            .field("cached_prices", &self.prices.len())
            .field("cached_rate", &self.rate)
            .finish()
    }
}
