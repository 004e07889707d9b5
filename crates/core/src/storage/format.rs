use chrono::NaiveDateTime;

use crate::errors::CoreError;
use crate::models::currency::Currency;
use crate::models::entry::{read_bool, write_bool, Entry};
use crate::models::portfolio::PortfolioStore;

/// Number of settings/timestamp lines before the first entry record.
pub const HEADER_LINES: usize = 6;

/// Timestamp layout (ISO 8601 local date-time, optional fraction).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// What a hydrate managed to read.
///
/// Hydration never fails as a whole: the first unreadable line stops it,
/// and everything read before that line is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrateReport {
    /// Entry records loaded.
    pub entries_loaded: usize,
    /// All six header lines were read.
    pub header_complete: bool,
    /// Lines left unread after the first failure.
    pub discarded_lines: usize,
    /// Why reading stopped early, with its 1-based line number.
    pub error: Option<String>,
    /// There was no save file to read.
    pub source_missing: bool,
}

impl HydrateReport {
    /// Nothing was discarded.
    pub fn is_complete(&self) -> bool {
        self.header_complete && self.discarded_lines == 0 && self.error.is_none()
    }

    pub(crate) fn missing_source() -> Self {
        Self {
            source_missing: true,
            ..Self::default()
        }
    }
}

/// Serialize a store to the save-file text.
///
/// Layout (one item per line):
/// ```text
/// <api key>
/// <graph currency>
/// <auto rate: true|false>
/// <exchange rate>
/// <price time: 2024-01-15T10:30:00>
/// <db time>
/// <ticker>,<quantity>,<update price>,<price>,<currency>[,<tag>,<value>]*
/// ...
/// ```
pub fn write_db(store: &PortfolioStore) -> String {
    let settings = store.settings();
    let mut out = String::new();

    for line in [
        settings.api_key.clone(),
        settings.graph_currency.to_string(),
        write_bool(settings.auto_rate).to_string(),
        settings.exchange_rate.to_string(),
        store.price_time().format(TIMESTAMP_FORMAT).to_string(),
        store.db_time().format(TIMESTAMP_FORMAT).to_string(),
    ] {
        out.push_str(&line);
        out.push('\n');
    }

    for entry in store.entries() {
        out.push_str(&entry.to_record());
        out.push('\n');
    }
    out
}

/// Rebuild a store from save-file text, best-effort.
pub fn read_db(text: &str) -> (PortfolioStore, HydrateReport) {
    let mut store = PortfolioStore::new();
    let mut report = HydrateReport::default();
    let lines: Vec<&str> = text.lines().collect();

    if let Err((line_no, e)) = read_header(&lines, &mut store) {
        report.error = Some(format!("line {line_no}: {e}"));
        report.discarded_lines = lines.len().saturating_sub(line_no - 1);
        return (store, report);
    }
    report.header_complete = true;

    for (offset, line) in lines[HEADER_LINES..].iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match Entry::from_record(line) {
            Ok(entry) => {
                store.load_entry(entry);
                report.entries_loaded += 1;
            }
            Err(e) => {
                let idx = HEADER_LINES + offset;
                report.error = Some(format!("line {}: {e}", idx + 1));
                report.discarded_lines = lines.len() - idx;
                break;
            }
        }
    }

    (store, report)
}

/// Read the six header lines into `store`, stopping at the first bad one.
/// Errors carry the 1-based line number.
fn read_header(lines: &[&str], store: &mut PortfolioStore) -> Result<(), (usize, CoreError)> {
    let at = |idx: usize| move |e: CoreError| (idx + 1, e);

    store.settings_mut().api_key = header_line(lines, 0)?.trim().to_string();

    store.settings_mut().graph_currency = Currency::new(header_line(lines, 1)?).map_err(at(1))?;

    store.settings_mut().auto_rate = read_bool(header_line(lines, 2)?);

    let rate_text = header_line(lines, 3)?.trim();
    let rate = rate_text
        .parse::<f64>()
        .ok()
        .filter(|r| r.is_finite() && *r > 0.0)
        .ok_or_else(|| {
            CoreError::InvalidFileFormat(format!("Invalid exchange rate '{rate_text}'"))
        })
        .map_err(at(3))?;
    store.settings_mut().exchange_rate = rate;

    let price_time = parse_timestamp(header_line(lines, 4)?).map_err(at(4))?;
    store.set_times(Some(price_time), None);

    let db_time = parse_timestamp(header_line(lines, 5)?).map_err(at(5))?;
    store.set_times(None, Some(db_time));

    Ok(())
}

fn header_line<'a>(lines: &[&'a str], idx: usize) -> Result<&'a str, (usize, CoreError)> {
    lines.get(idx).copied().ok_or_else(|| {
        (
            idx + 1,
            CoreError::InvalidFileFormat("unexpected end of file in settings".into()),
        )
    })
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime, CoreError> {
    text.trim()
        .parse::<NaiveDateTime>()
        .map_err(|e| CoreError::InvalidFileFormat(format!("Invalid timestamp '{text}': {e}")))
}
