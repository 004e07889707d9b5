use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::FetchError;
use crate::models::currency::Currency;

/// Abstraction over the remote quote service.
///
/// Implementations perform exactly one request per call and never cache;
/// caching and batching live in `PriceSync`. Errors must keep the
/// unparseable / connection split so callers can report them apart.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Human-readable name of this source (for logs/errors).
    fn name(&self) -> &str;

    /// Latest unit price of `ticker`, in the instrument's trading currency.
    async fn fetch_price(&self, ticker: &str) -> Result<f64, FetchError>;

    /// Units of `quote` bought by one unit of `base`.
    async fn fetch_exchange_rate(&self, base: &Currency, quote: &Currency) -> Result<f64, FetchError>;

    /// The same source authenticating with another API key.
    /// `None` when this source takes no key; it is then kept as is.
    fn rekeyed(&self, _api_key: &str) -> Option<Arc<dyn QuoteSource>> {
        None
    }
}
