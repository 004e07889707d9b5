use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{redact_query, FetchError};
use crate::models::currency::Currency;
use super::traits::QuoteSource;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER: &str = "Alpha Vantage";

/// Zero-based comma-delimited position of the price in a GLOBAL_QUOTE CSV
/// response (header row and data row counted together).
pub const PRICE_FIELD_INDEX: usize = 13;

/// Byte offset of the rate value in a CURRENCY_EXCHANGE_RATE response.
pub const RATE_BYTE_OFFSET: usize = 257;

/// Alpha Vantage quote service.
///
/// - **Free tier**: 25 requests/day (across ALL endpoints).
/// - **Requires**: API key.
/// - **Prices**: `GLOBAL_QUOTE` with `datatype=csv`.
/// - **Rates**: `CURRENCY_EXCHANGE_RATE` (JSON).
pub struct AlphaVantageSource {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageSource {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point at a different endpoint (proxies, local test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Failing to reach the service is a connection error. Once a response
    /// has arrived, an unreadable body counts as unparseable content.
    async fn get_text(&self, params: &[(&str, &str)]) -> Result<String, FetchError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?;
        response.text().await.map_err(|e| {
            FetchError::unparseable(
                PROVIDER,
                format!("Could not read response body: {}", redact_query(&e.to_string())),
            )
        })
    }
}

#[async_trait]
impl QuoteSource for AlphaVantageSource {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn fetch_price(&self, ticker: &str) -> Result<f64, FetchError> {
        debug!("{PROVIDER}: requesting quote for {ticker}");
        let body = self
            .get_text(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", ticker),
                ("datatype", "csv"),
            ])
            .await?;
        parse_global_quote_csv(&body)
    }

    async fn fetch_exchange_rate(&self, base: &Currency, quote: &Currency) -> Result<f64, FetchError> {
        debug!("{PROVIDER}: requesting {base}->{quote} rate");
        let body = self
            .get_text(&[
                ("function", "CURRENCY_EXCHANGE_RATE"),
                ("from_currency", base.code()),
                ("to_currency", quote.code()),
            ])
            .await?;
        parse_exchange_rate(&body)
    }

    fn rekeyed(&self, api_key: &str) -> Option<Arc<dyn QuoteSource>> {
        Some(Arc::new(Self {
            client: self.client.clone(),
            api_key: api_key.to_string(),
            base_url: self.base_url.clone(),
        }))
    }
}

// ── Response parsing ────────────────────────────────────────────────

/// Extract the price from a GLOBAL_QUOTE CSV body.
///
/// The price is the text between the 13th and 14th comma (or end of body).
pub fn parse_global_quote_csv(body: &str) -> Result<f64, FetchError> {
    let field = body.split(',').nth(PRICE_FIELD_INDEX).ok_or_else(|| {
        FetchError::unparseable(
            PROVIDER,
            format!("Quote response has fewer than {} fields. API limit may be exceeded.", PRICE_FIELD_INDEX + 1),
        )
    })?;
    parse_amount(field.trim(), "price")
}

#[derive(Deserialize)]
struct ExchangeRateResponse {
    #[serde(rename = "Realtime Currency Exchange Rate")]
    realtime: Option<RealtimeRate>,
}

#[derive(Deserialize)]
struct RealtimeRate {
    #[serde(rename = "5. Exchange Rate")]
    rate: Option<String>,
}

/// Extract the rate from a CURRENCY_EXCHANGE_RATE body.
///
/// The JSON field is read when present; otherwise the quoted value starting
/// [`RATE_BYTE_OFFSET`] bytes into the body is used.
pub fn parse_exchange_rate(body: &str) -> Result<f64, FetchError> {
    if let Ok(resp) = serde_json::from_str::<ExchangeRateResponse>(body) {
        if let Some(rate) = resp.realtime.and_then(|r| r.rate) {
            return parse_amount(rate.trim(), "exchange rate");
        }
    }
    parse_rate_at_offset(body)
}

/// Read the text from [`RATE_BYTE_OFFSET`] up to the next double quote.
pub fn parse_rate_at_offset(body: &str) -> Result<f64, FetchError> {
    let tail = body.as_bytes().get(RATE_BYTE_OFFSET..).ok_or_else(|| {
        FetchError::unparseable(
            PROVIDER,
            format!("Exchange rate response is shorter than {RATE_BYTE_OFFSET} bytes"),
        )
    })?;
    let end = tail.iter().position(|&b| b == b'"').unwrap_or(tail.len());
    let text = std::str::from_utf8(&tail[..end]).map_err(|_| {
        FetchError::unparseable(PROVIDER, "Exchange rate field is not valid UTF-8")
    })?;
    parse_amount(text.trim(), "exchange rate")
}

/// Amounts must be finite and non-negative.
fn parse_amount(text: &str, what: &str) -> Result<f64, FetchError> {
    let value: f64 = text.parse().map_err(|_| {
        FetchError::unparseable(PROVIDER, format!("Invalid {what} '{text}'"))
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(FetchError::unparseable(
            PROVIDER,
            format!("Invalid {what} {value} (must be finite and non-negative)"),
        ));
    }
    Ok(value)
}
