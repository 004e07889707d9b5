use thiserror::Error;

/// Unified error type for the entire tagfolio-core library.
/// Every public function returns `Result<T, CoreError>`.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── User Input ──────────────────────────────────────────────────
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid currency code '{0}': must be exactly 3 ASCII letters (e.g., CAD, USD)")]
    InvalidCurrency(String),

    // ── Entries & Tags ──────────────────────────────────────────────
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Tag pair {tag}={value} is not tracked by the index")]
    UntrackedTag { tag: String, value: String },

    // ── Conversion ──────────────────────────────────────────────────
    #[error("No exchange rate available to convert {from} into {to}")]
    UnsupportedConversion { from: String, to: String },

    // ── Storage / File ──────────────────────────────────────────────
    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("File I/O error: {0}")]
    FileIO(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ── Remote quotes ───────────────────────────────────────────────
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("A price refresh is already running")]
    RefreshInFlight,

    #[error("Background price refresh failed: {0}")]
    Worker(String),
}

/// Classification of a failed remote fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// The response arrived but held no valid number at the agreed position.
    Unparseable,
    /// The request could not be completed (no network, HTTP failure, timeout).
    Connection,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchErrorKind::Unparseable => write!(f, "unparseable"),
            FetchErrorKind::Connection => write!(f, "connection"),
        }
    }
}

/// A failed price or exchange-rate fetch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("Unparseable response ({source_name}): {message}")]
    Unparseable {
        source_name: String,
        message: String,
    },

    #[error("Connection error: {0}")]
    Connection(String),
}

impl FetchError {
    pub fn unparseable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Unparseable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Unparseable { .. } => FetchErrorKind::Unparseable,
            FetchError::Connection(_) => FetchErrorKind::Connection,
        }
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::FileIO(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Connection(redact_query(&e.to_string()))
    }
}

/// reqwest errors carry the full URL, including the apikey query parameter.
pub(crate) fn redact_query(msg: &str) -> String {
    match msg.find('?') {
        Some(idx) => format!("{}?<query redacted>", &msg[..idx]),
        None => msg.to_string(),
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        CoreError::Fetch(FetchError::from(e))
    }
}
