use crate::errors::CoreError;
use crate::models::currency::{Currency, RateSource};

/// Converts amounts between currencies using a pluggable [`RateSource`].
///
/// - Same currency → identity.
/// - Otherwise the rate source supplies the multiplication factor; pairs it
///   doesn't cover fail with `UnsupportedConversion`.
pub struct CurrencyService;

impl CurrencyService {
    pub fn new() -> Self {
        Self
    }

    /// Convert `amount` from one currency into another.
    /// E.g., with a CAD→USD rate of 0.73, convert(100.0, CAD, USD) → 73.0
    pub fn convert(
        &self,
        amount: f64,
        from: &Currency,
        to: &Currency,
        rates: &dyn RateSource,
    ) -> Result<f64, CoreError> {
        if from == to {
            return Ok(amount);
        }

        let factor = rates
            .factor(from, to)
            .ok_or_else(|| CoreError::UnsupportedConversion {
                from: from.to_string(),
                to: to.to_string(),
            })?;

        Ok(amount * factor)
    }
}

impl Default for CurrencyService {
    fn default() -> Self {
        Self::new()
    }
}
