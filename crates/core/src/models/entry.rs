use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::errors::CoreError;

use super::currency::Currency;

/// Label used when grouping by a tag the entry doesn't carry.
pub const NOT_CLASSIFIED: &str = "Not classified";

/// Tag name → tag value. Keys are unique; ordering carries no meaning.
pub type Tags = BTreeMap<String, String>;

/// A single portfolio holding plus its classification tags.
///
/// **Identity** is the process-local `id`, not the ticker: two entries may
/// hold the same ticker with different tags or quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(skip, default = "Uuid::new_v4")]
    id: Uuid,
    ticker: String,
    quantity: f64,
    price: f64,
    currency: Currency,
    /// `true` when the price is refreshed from the quote service,
    /// `false` when it was entered by hand and must be left alone.
    update_price: bool,
    tags: Tags,
}

impl Entry {
    pub fn new(
        ticker: impl Into<String>,
        quantity: f64,
        update_price: bool,
        price: f64,
        currency: Currency,
    ) -> Result<Self, CoreError> {
        let ticker = ticker.into().trim().to_string();
        if ticker.is_empty() {
            return Err(CoreError::InvalidInput("The ticker must be set.".into()));
        }
        check_field("ticker", &ticker)?;
        if !quantity.is_finite() {
            return Err(CoreError::InvalidInput(format!(
                "Quantity for {ticker} must be a finite number"
            )));
        }
        if !price.is_finite() {
            return Err(CoreError::InvalidInput(format!(
                "Price for {ticker} must be a finite number"
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            ticker,
            quantity,
            price,
            currency,
            update_price,
            tags: Tags::new(),
        })
    }

    /// Builder-style [`Entry::add_tag`].
    pub fn with_tag(mut self, tag: &str, value: &str) -> Result<Self, CoreError> {
        self.add_tag(tag, value)?;
        Ok(self)
    }

    /// Attach a tag. Pairs with an empty name or value are skipped and
    /// `Ok(false)` is returned. Setting an existing tag replaces its value.
    pub fn add_tag(&mut self, tag: &str, value: &str) -> Result<bool, CoreError> {
        let tag = tag.trim();
        let value = value.trim();
        if tag.is_empty() || value.is_empty() {
            return Ok(false);
        }
        check_field("tag", tag)?;
        check_field("tag value", value)?;
        self.tags.insert(tag.to_string(), value.to_string());
        Ok(true)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn set_price(&mut self, price: f64) {
        self.price = price;
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn update_price(&self) -> bool {
        self.update_price
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Market value of the holding in its own currency.
    pub fn value(&self) -> f64 {
        self.price * self.quantity
    }

    pub fn contains_pair(&self, tag: &str, value: &str) -> bool {
        self.tags.get(tag).is_some_and(|v| v == value)
    }

    /// The entry's value for `tag`, or [`NOT_CLASSIFIED`] when absent.
    pub fn value_for_tag(&self, tag: &str) -> &str {
        self.tags.get(tag).map(String::as_str).unwrap_or(NOT_CLASSIFIED)
    }

    /// Equal in everything but identity.
    pub fn same_holding(&self, other: &Entry) -> bool {
        self.ticker == other.ticker
            && self.quantity == other.quantity
            && self.price == other.price
            && self.currency == other.currency
            && self.update_price == other.update_price
            && self.tags == other.tags
    }

    /// One-line human-readable summary.
    pub fn display_line(&self) -> String {
        let mut summary = format!(
            "Ticker: {}, Currency: {}, Quantity: {}, Price: {}",
            self.ticker, self.currency, self.quantity, self.price
        );
        for (tag, value) in &self.tags {
            summary.push_str(&format!(", {tag}: {value}"));
        }
        summary
    }

    /// Serialize to one save-file record (no trailing newline):
    /// `ticker,quantity,updatePrice,price,currency[,tag,value]*`
    pub fn to_record(&self) -> String {
        let mut line = format!(
            "{},{},{},{},{}",
            self.ticker,
            self.quantity,
            write_bool(self.update_price),
            self.price,
            self.currency
        );
        for (tag, value) in &self.tags {
            line.push(',');
            line.push_str(tag);
            line.push(',');
            line.push_str(value);
        }
        line
    }

    /// Parse a save-file record produced by [`Entry::to_record`].
    pub fn from_record(line: &str) -> Result<Self, CoreError> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
        if fields.len() < 5 {
            return Err(CoreError::InvalidFileFormat(format!(
                "Entry record needs at least 5 fields, found {}",
                fields.len()
            )));
        }

        let quantity: f64 = fields[1].trim().parse().map_err(|_| {
            CoreError::InvalidFileFormat(format!("Invalid quantity '{}'", fields[1]))
        })?;
        let price: f64 = fields[3].trim().parse().map_err(|_| {
            CoreError::InvalidFileFormat(format!("Invalid price '{}'", fields[3]))
        })?;
        let currency = Currency::new(fields[4]).map_err(|e| {
            CoreError::InvalidFileFormat(e.to_string())
        })?;

        let mut entry = Entry::new(fields[0], quantity, read_bool(fields[2]), price, currency)
            .map_err(|e| CoreError::InvalidFileFormat(e.to_string()))?;

        // Trailing empty fields come from a dangling comma; ignore them.
        let mut tag_fields = &fields[5..];
        while let Some((last, rest)) = tag_fields.split_last() {
            if !last.is_empty() {
                break;
            }
            tag_fields = rest;
        }
        if tag_fields.len() % 2 != 0 {
            return Err(CoreError::InvalidFileFormat(format!(
                "Tag '{}' of {} has no value",
                tag_fields[tag_fields.len() - 1],
                entry.ticker
            )));
        }
        for pair in tag_fields.chunks(2) {
            entry
                .add_tag(pair[0], pair[1])
                .map_err(|e| CoreError::InvalidFileFormat(e.to_string()))?;
        }

        Ok(entry)
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_line())
    }
}

/// Raw, unvalidated form input for a new or edited entry.
///
/// Mirrors what a form hands over: text fields that may not parse.
/// Nothing is created unless every check passes.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDraft {
    pub ticker: String,
    pub quantity: String,
    /// Ignored when `update_price` is set; the price comes from the quote service.
    pub price: String,
    pub currency: Currency,
    pub update_price: bool,
    /// Tag rows; rows with an empty name or value are skipped.
    pub tags: Vec<(String, String)>,
}

impl EntryDraft {
    pub fn new(ticker: impl Into<String>, quantity: impl Into<String>, currency: Currency) -> Self {
        Self {
            ticker: ticker.into(),
            quantity: quantity.into(),
            price: String::new(),
            currency,
            update_price: true,
            tags: Vec::new(),
        }
    }

    /// Switch to a manually entered price.
    pub fn with_manual_price(mut self, price: impl Into<String>) -> Self {
        self.price = price.into();
        self.update_price = false;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((tag.into(), value.into()));
        self
    }

    /// Validate the draft. When `update_price` is set the returned entry has
    /// a price of 0 until one is fetched.
    pub fn build(&self) -> Result<Entry, CoreError> {
        if self.ticker.trim().is_empty() {
            return Err(CoreError::InvalidInput("The ticker must be set.".into()));
        }

        let quantity = parse_number(&self.quantity).ok_or_else(|| {
            CoreError::InvalidInput(format!(
                "Could not interpret the quantity field ({}) as a number.",
                self.quantity
            ))
        })?;

        let price = if self.update_price {
            0.0
        } else {
            parse_number(&self.price).ok_or_else(|| {
                CoreError::InvalidInput(format!(
                    "Could not interpret the price field ({}) as a number.",
                    self.price
                ))
            })?
        };

        let mut entry = Entry::new(
            self.ticker.as_str(),
            quantity,
            self.update_price,
            price,
            self.currency.clone(),
        )?;
        for (tag, value) in &self.tags {
            entry.add_tag(tag, value)?;
        }
        Ok(entry)
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Commas and line breaks would split a save-file record.
fn check_field(what: &str, text: &str) -> Result<(), CoreError> {
    if text.contains([',', '\n', '\r']) {
        return Err(CoreError::InvalidInput(format!(
            "The {what} '{text}' may not contain commas or line breaks."
        )));
    }
    Ok(())
}

pub(crate) fn write_bool(val: bool) -> &'static str {
    if val {
        "true"
    } else {
        "false"
    }
}

/// Anything other than the exact text `true` reads as false.
pub(crate) fn read_bool(val: &str) -> bool {
    val.trim() == "true"
}
