use log::{info, warn};
use std::io::ErrorKind;
use std::path::Path;

use crate::errors::CoreError;
use crate::models::portfolio::PortfolioStore;

use super::format::{self, HydrateReport};

/// Save file used when the caller doesn't pick one.
pub const DEFAULT_SAVE_FILE: &str = "prevInfo.txt";

/// High-level storage operations: save/load a store to/from text or files.
pub struct StorageManager;

impl StorageManager {
    /// Serialize a store to the save-file text.
    pub fn save_to_string(store: &PortfolioStore) -> String {
        format::write_db(store)
    }

    /// Rebuild a store from save-file text. Never fails; see [`HydrateReport`].
    pub fn load_from_str(text: &str) -> (PortfolioStore, HydrateReport) {
        let (store, report) = format::read_db(text);
        if let Some(err) = &report.error {
            warn!(
                "save data partially loaded ({} entries, {} lines discarded): {err}",
                report.entries_loaded, report.discarded_lines
            );
        } else {
            info!("loaded {} entries", report.entries_loaded);
        }
        (store, report)
    }

    /// Write the store to `path`, replacing any previous contents.
    pub fn save_to_file(store: &PortfolioStore, path: impl AsRef<Path>) -> Result<(), CoreError> {
        let text = Self::save_to_string(store);
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Load a store from `path`.
    ///
    /// A missing file yields an empty store and a report with
    /// `source_missing` set. Other read errors are returned.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<(PortfolioStore, HydrateReport), CoreError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::load_from_str(&text)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no save file at {}, starting empty", path.display());
                Ok((PortfolioStore::new(), HydrateReport::missing_source()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
