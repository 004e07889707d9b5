use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::CoreError;

/// An ISO-style currency code (e.g., "CAD", "USD").
///
/// The set of currencies is open: any 3-letter alphabetic code is accepted
/// and stored uppercased. Conversion between two codes is delegated to a
/// [`RateSource`], so new currencies never touch the conversion logic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Validate and normalize a currency code.
    pub fn new(code: impl AsRef<str>) -> Result<Self, CoreError> {
        let raw = code.as_ref();
        let trimmed = raw.trim().to_uppercase();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::InvalidCurrency(raw.to_string()));
        }
        Ok(Self(trimmed))
    }

    pub fn cad() -> Self {
        Self("CAD".to_string())
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.0
    }
}

/// Anything that can quote a conversion factor between two currencies.
///
/// The returned factor is what an amount in `from` must be multiplied by to
/// be expressed in `to`. `None` means the pair is not covered.
pub trait RateSource {
    fn factor(&self, from: &Currency, to: &Currency) -> Option<f64>;
}

/// A single quoted exchange rate: one unit of `base` buys `rate` units of `quote`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub base: Currency,
    pub quote: Currency,
    pub rate: f64,
}

impl ExchangeRate {
    pub fn new(base: Currency, quote: Currency, rate: f64) -> Self {
        Self { base, quote, rate }
    }
}

impl RateSource for ExchangeRate {
    fn factor(&self, from: &Currency, to: &Currency) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        if *from == self.base && *to == self.quote {
            return Some(self.rate);
        }
        if *from == self.quote && *to == self.base && self.rate != 0.0 {
            return Some(1.0 / self.rate);
        }
        None
    }
}
