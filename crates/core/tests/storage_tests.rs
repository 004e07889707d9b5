// ═══════════════════════════════════════════════════════════════════
// Storage Tests: save-file format, hydrate reports, StorageManager
// ═══════════════════════════════════════════════════════════════════

use chrono::NaiveDate;
use tagfolio_core::errors::CoreError;
use tagfolio_core::models::currency::Currency;
use tagfolio_core::models::entry::Entry;
use tagfolio_core::models::portfolio::PortfolioStore;
use tagfolio_core::storage::format::{self, HEADER_LINES};
use tagfolio_core::storage::manager::{StorageManager, DEFAULT_SAVE_FILE};

fn sample_store() -> PortfolioStore {
    let mut store = PortfolioStore::new();
    store.set_api_key("ABC123");
    store.set_graph_currency(Currency::usd());
    store.set_exchange_rate(0.7305).unwrap();
    store.create_entry(
        Entry::new("AAPL", 10.0, true, 185.59, Currency::usd())
            .unwrap()
            .with_tag("sector", "tech")
            .unwrap()
            .with_tag("account", "tfsa")
            .unwrap(),
    );
    store.create_entry(
        Entry::new("GIC", 1.0, false, 5000.0, Currency::cad())
            .unwrap()
            .with_tag("account", "rrsp")
            .unwrap(),
    );
    store.create_entry(Entry::new("RY.TO", 12.5, true, 131.07, Currency::cad()).unwrap());
    store
}

const HEADER: &str = "KEY\nCAD\ntrue\n0.75\n2024-01-15T10:30:00\n2024-01-16T08:00:00.250\n";

fn assert_same_entries(a: &PortfolioStore, b: &PortfolioStore) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.entries().iter().zip(b.entries()) {
        assert!(x.same_holding(y), "{x} != {y}");
    }
}

// ═══════════════════════════════════════════════════════════════════
// Writing
// ═══════════════════════════════════════════════════════════════════

mod write {
    use super::*;

    #[test]
    fn header_then_one_line_per_entry() {
        let text = format::write_db(&sample_store());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), HEADER_LINES + 3);
        assert_eq!(lines[0], "ABC123");
        assert_eq!(lines[1], "USD");
        assert_eq!(lines[2], "false");
        assert_eq!(lines[3], "0.7305");
        assert_eq!(lines[6], "AAPL,10,true,185.59,USD,account,tfsa,sector,tech");
        assert_eq!(lines[7], "GIC,1,false,5000,CAD,account,rrsp");
        assert_eq!(lines[8], "RY.TO,12.5,true,131.07,CAD");
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn empty_store_writes_only_header() {
        let text = format::write_db(&PortfolioStore::new());
        assert_eq!(text.lines().count(), HEADER_LINES);
    }

    #[test]
    fn auto_rate_flag_written() {
        let mut store = PortfolioStore::new();
        store.set_auto_rate(true);
        let text = format::write_db(&store);
        assert_eq!(text.lines().nth(2), Some("true"));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Reading
// ═══════════════════════════════════════════════════════════════════

mod read {
    use super::*;

    #[test]
    fn round_trip_preserves_everything() {
        let original = sample_store();
        let (loaded, report) = format::read_db(&format::write_db(&original));

        assert!(report.is_complete());
        assert_eq!(report.entries_loaded, 3);
        assert_eq!(loaded.settings().api_key, "ABC123");
        assert_eq!(loaded.settings().graph_currency, Currency::usd());
        assert_eq!(loaded.settings().exchange_rate, 0.7305);
        assert!(!loaded.settings().auto_rate);
        assert_eq!(loaded.price_time(), original.price_time());
        assert_eq!(loaded.db_time(), original.db_time());
        assert_same_entries(&loaded, &original);
    }

    #[test]
    fn tag_index_rebuilt_on_load() {
        let (loaded, _) = format::read_db(&format::write_db(&sample_store()));
        assert_eq!(loaded.tags(), vec!["account", "sector"]);
        assert_eq!(loaded.values_for_tag("account"), Some(vec!["rrsp", "tfsa"]));
        assert_eq!(loaded.tag_index().count("sector", "tech"), 1);
    }

    #[test]
    fn parses_header_fields() {
        let (store, report) = format::read_db(HEADER);
        assert!(report.is_complete());
        assert_eq!(store.settings().api_key, "KEY");
        assert!(store.settings().auto_rate);
        assert_eq!(store.exchange_rate(), 0.75);
        assert_eq!(
            store.price_time(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(10, 30, 0).unwrap()
        );
        assert_eq!(
            store.db_time(),
            NaiveDate::from_ymd_opt(2024, 1, 16).unwrap().and_hms_milli_opt(8, 0, 0, 250).unwrap()
        );
        assert!(store.is_empty());
    }

    #[test]
    fn loading_does_not_touch_db_time() {
        let text = format!("{HEADER}AAPL,1,true,100,USD\n");
        let (store, _) = format::read_db(&text);
        assert_eq!(store.len(), 1);
        assert_eq!(store.dates_label(), "Database last modified 2024-01-16 08:00; prices last updated 2024-01-15 10:30");
    }

    #[test]
    fn crlf_and_blank_lines_tolerated() {
        let text = "KEY\r\nCAD\r\nfalse\r\n1\r\n2024-01-15T10:30:00\r\n2024-01-15T10:30:00\r\n\r\nAAPL,1,true,100,USD,sector,tech\r\n\r\n";
        let (store, report) = format::read_db(text);
        assert!(report.is_complete(), "{report:?}");
        assert_eq!(store.len(), 1);
        assert_eq!(store.entries()[0].value_for_tag("sector"), "tech");
    }

    #[test]
    fn bad_entry_stops_reading_and_keeps_earlier_ones() {
        let text = format!(
            "{HEADER}AAPL,1,true,100,USD\nMSFT,lots,true,400,USD\nGOOG,2,true,150,USD\n"
        );
        let (store, report) = format::read_db(&text);

        assert!(report.header_complete);
        assert_eq!(report.entries_loaded, 1);
        assert_eq!(report.discarded_lines, 2);
        assert!(!report.is_complete());
        let error = report.error.as_deref().unwrap();
        assert!(error.starts_with("line 8:"), "{error}");
        assert!(error.contains("lots"));

        assert_eq!(store.len(), 1);
        assert_eq!(store.entries()[0].ticker(), "AAPL");
        assert_eq!(store.settings().api_key, "KEY");
    }

    #[test]
    fn bad_header_keeps_fields_read_so_far() {
        let text = "KEY\nUSD\ntrue\nabc\n2024-01-15T10:30:00\n2024-01-15T10:30:00\nAAPL,1,true,100,USD\n";
        let (store, report) = format::read_db(text);

        assert!(!report.header_complete);
        assert_eq!(report.entries_loaded, 0);
        assert_eq!(report.discarded_lines, 4);
        assert!(report.error.as_deref().unwrap().starts_with("line 4:"));

        assert_eq!(store.settings().api_key, "KEY");
        assert_eq!(store.settings().graph_currency, Currency::usd());
        assert!(store.settings().auto_rate);
        assert_eq!(store.exchange_rate(), 1.0);
        assert!(store.is_empty());
    }

    #[test]
    fn non_positive_rate_rejected() {
        let text = "KEY\nCAD\nfalse\n0\n2024-01-15T10:30:00\n2024-01-15T10:30:00\n";
        let (_, report) = format::read_db(text);
        assert!(report.error.unwrap().starts_with("line 4:"));
    }

    #[test]
    fn bad_currency_line() {
        let (store, report) = format::read_db("KEY\nloonies\nfalse\n1\n");
        assert!(report.error.unwrap().starts_with("line 2:"));
        assert_eq!(store.settings().graph_currency, Currency::cad());
    }

    #[test]
    fn bad_timestamp_line() {
        let text = "KEY\nCAD\nfalse\n1\nyesterday\n2024-01-15T10:30:00\n";
        let (_, report) = format::read_db(text);
        assert!(report.error.unwrap().starts_with("line 5:"));
        assert_eq!(report.discarded_lines, 2);
    }

    #[test]
    fn truncated_header() {
        let (store, report) = format::read_db("KEY\nCAD\nfalse\n");
        assert!(!report.header_complete);
        assert_eq!(report.discarded_lines, 0);
        assert!(report.error.unwrap().starts_with("line 4:"));
        assert_eq!(store.settings().api_key, "KEY");
    }

    #[test]
    fn empty_text_gives_defaults() {
        let (store, report) = format::read_db("");
        assert!(!report.header_complete);
        assert!(store.is_empty());
        assert_eq!(store.settings().graph_currency, Currency::cad());
        assert_eq!(store.exchange_rate(), 1.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
// StorageManager
// ═══════════════════════════════════════════════════════════════════

mod manager {
    use super::*;

    #[test]
    fn default_file_name() {
        assert_eq!(DEFAULT_SAVE_FILE, "prevInfo.txt");
    }

    #[test]
    fn string_round_trip() {
        let store = sample_store();
        let text = StorageManager::save_to_string(&store);
        let (loaded, report) = StorageManager::load_from_str(&text);
        assert!(report.is_complete());
        assert_same_entries(&loaded, &store);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SAVE_FILE);
        let store = sample_store();

        StorageManager::save_to_file(&store, &path).unwrap();
        let (loaded, report) = StorageManager::load_from_file(&path).unwrap();

        assert!(report.is_complete());
        assert!(!report.source_missing);
        assert_same_entries(&loaded, &store);
        assert_eq!(loaded.settings(), store.settings());
    }

    #[test]
    fn save_overwrites_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.txt");

        StorageManager::save_to_file(&sample_store(), &path).unwrap();
        StorageManager::save_to_file(&PortfolioStore::new(), &path).unwrap();

        let (loaded, _) = StorageManager::load_from_file(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn missing_file_gives_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let (store, report) = StorageManager::load_from_file(dir.path().join("absent.txt")).unwrap();
        assert!(report.source_missing);
        assert!(report.error.is_none());
        assert!(store.is_empty());
        assert_eq!(store.settings().api_key, "");
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no").join("such").join("dir.txt");
        let err = StorageManager::save_to_file(&sample_store(), path).unwrap_err();
        assert!(matches!(err, CoreError::FileIO(_)));
    }

    #[test]
    fn unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StorageManager::load_from_file(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::FileIO(_)));
    }

    #[test]
    fn partial_file_loads_what_it_can() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("damaged.txt");
        std::fs::write(&path, format!("{HEADER}AAPL,1,true,100,USD\nBROKEN\n")).unwrap();

        let (store, report) = StorageManager::load_from_file(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(report.discarded_lines, 1);
    }
}
