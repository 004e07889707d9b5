use serde::{Deserialize, Serialize};

use super::currency::{Currency, ExchangeRate};

/// User-configurable settings, stored in the first lines of the save file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Key sent with every quote-service request.
    pub api_key: String,

    /// The currency all aggregated totals are expressed in.
    pub graph_currency: Currency,

    /// Units of `rate_quote` per one unit of `rate_base`.
    /// Used as-is in manual mode; in auto mode it holds the last fetched value.
    pub exchange_rate: f64,

    /// When set, the exchange rate is fetched from the quote service.
    pub auto_rate: bool,

    /// The pair `exchange_rate` is quoted for. Not part of the save file.
    #[serde(default = "Currency::cad")]
    pub rate_base: Currency,
    #[serde(default = "Currency::usd")]
    pub rate_quote: Currency,
}

impl Settings {
    /// The currently stored rate as a conversion source.
    pub fn stored_rate(&self) -> ExchangeRate {
        ExchangeRate::new(self.rate_base.clone(), self.rate_quote.clone(), self.exchange_rate)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            graph_currency: Currency::cad(),
            exchange_rate: 1.0,
            auto_rate: false,
            rate_base: Currency::cad(),
            rate_quote: Currency::usd(),
        }
    }
}
