// ═══════════════════════════════════════════════════════════════════
// Provider Tests: Alpha Vantage response parsing, QuoteSource trait
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use tagfolio_core::errors::{FetchError, FetchErrorKind};
use tagfolio_core::models::currency::Currency;
use tagfolio_core::providers::alphavantage::{
    parse_exchange_rate, parse_global_quote_csv, parse_rate_at_offset, AlphaVantageSource,
    PRICE_FIELD_INDEX, RATE_BYTE_OFFSET,
};
use tagfolio_core::providers::traits::QuoteSource;

// ═══════════════════════════════════════════════════════════════════
// Sample bodies
// ═══════════════════════════════════════════════════════════════════

const QUOTE_CSV: &str = "symbol,open,high,low,price,volume,latestDay,previousClose,change,changePercent\r\n\
AAPL,185.0900,186.4000,183.9200,185.5900,53490214,2024-01-12,185.9200,-0.3300,-0.1775%\r\n";

const RATE_JSON: &str = "{\n    \"Realtime Currency Exchange Rate\": {\n        \"1. From_Currency Code\": \"CAD\",\n        \"2. From_Currency Name\": \"Canadian Dollar\",\n        \"3. To_Currency Code\": \"USD\",\n        \"4. To_Currency Name\": \"United States Dollar\",\n        \"5. Exchange Rate\": \"0.73050000\",\n        \"6. Last Refreshed\": \"2024-01-15 10:30:01\",\n        \"7. Time Zone\": \"UTC\",\n        \"8. Bid Price\": \"0.73040000\",\n        \"9. Ask Price\": \"0.73060000\"\n    }\n}";

const RATE_LIMIT_NOTE: &str = "{\n    \"Note\": \"Thank you for using Alpha Vantage! Our standard API rate limit is 25 requests per day.\"\n}";

/// Serve one canned HTTP response on loopback and return the base URL.
async fn serve_once(response: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });
    format!("http://{addr}/query")
}

fn quote_with_price(price: &str) -> String {
    format!(
        "symbol,open,high,low,price,volume,latestDay,previousClose,change,changePercent\r\n\
         XYZ,1.0,1.0,1.0,{price},100,2024-01-12,1.0,0.0,0.0%\r\n"
    )
}

// ═══════════════════════════════════════════════════════════════════
// GLOBAL_QUOTE CSV
// ═══════════════════════════════════════════════════════════════════

mod global_quote {
    use super::*;

    #[test]
    fn price_field_position() {
        assert_eq!(PRICE_FIELD_INDEX, 13);
        assert_eq!(QUOTE_CSV.split(',').nth(PRICE_FIELD_INDEX), Some("185.5900"));
    }

    #[test]
    fn parses_price() {
        assert_eq!(parse_global_quote_csv(QUOTE_CSV).unwrap(), 185.59);
    }

    #[test]
    fn zero_price_is_valid() {
        assert_eq!(parse_global_quote_csv(&quote_with_price("0.0000")).unwrap(), 0.0);
    }

    #[test]
    fn short_body_is_unparseable() {
        let err = parse_global_quote_csv("symbol,open,high\r\n").unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Unparseable);
        assert!(err.to_string().contains("fewer than 14 fields"));
    }

    #[test]
    fn json_error_body_is_unparseable() {
        let err = parse_global_quote_csv(RATE_LIMIT_NOTE).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Unparseable);
    }

    #[test]
    fn non_numeric_price_is_unparseable() {
        let err = parse_global_quote_csv(&quote_with_price("N/A")).unwrap_err();
        assert!(matches!(err, FetchError::Unparseable { ref message, .. } if message.contains("N/A")));
    }

    #[test]
    fn negative_price_is_unparseable() {
        let err = parse_global_quote_csv(&quote_with_price("-3.5")).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Unparseable);
    }

    #[test]
    fn empty_body_is_unparseable() {
        assert!(parse_global_quote_csv("").is_err());
    }
}

// ═══════════════════════════════════════════════════════════════════
// CURRENCY_EXCHANGE_RATE
// ═══════════════════════════════════════════════════════════════════

mod exchange_rate {
    use super::*;

    #[test]
    fn rate_sits_at_fixed_offset() {
        assert_eq!(RATE_BYTE_OFFSET, 257);
        assert!(RATE_JSON[RATE_BYTE_OFFSET..].starts_with("0.73050000\""));
    }

    #[test]
    fn parses_json_field() {
        assert_eq!(parse_exchange_rate(RATE_JSON).unwrap(), 0.7305);
    }

    #[test]
    fn offset_parser_reads_the_same_value() {
        assert_eq!(parse_rate_at_offset(RATE_JSON).unwrap(), 0.7305);
    }

    #[test]
    fn truncated_body_falls_back_to_offset() {
        let truncated = &RATE_JSON[..300];
        assert!(serde_json::from_str::<serde_json::Value>(truncated).is_err());
        assert_eq!(parse_exchange_rate(truncated).unwrap(), 0.7305);
    }

    #[test]
    fn reformatted_json_still_parses() {
        let compact = r#"{"Realtime Currency Exchange Rate":{"5. Exchange Rate":"1.36890000"}}"#;
        assert_eq!(parse_exchange_rate(compact).unwrap(), 1.3689);
    }

    #[test]
    fn short_body_is_unparseable() {
        let err = parse_exchange_rate(RATE_LIMIT_NOTE).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Unparseable);
        assert!(err.to_string().contains("shorter than 257 bytes"));
    }

    #[test]
    fn garbage_at_offset_is_unparseable() {
        let body = "x".repeat(400);
        let err = parse_rate_at_offset(&body).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Unparseable);
    }

    #[test]
    fn non_numeric_json_rate_is_unparseable() {
        let body = r#"{"Realtime Currency Exchange Rate":{"5. Exchange Rate":"n/a"}}"#;
        assert!(parse_exchange_rate(body).is_err());
    }
}

// ═══════════════════════════════════════════════════════════════════
// QuoteSource trait
// ═══════════════════════════════════════════════════════════════════

struct FixedSource;

#[async_trait]
impl QuoteSource for FixedSource {
    fn name(&self) -> &str {
        "Fixed"
    }

    async fn fetch_price(&self, _ticker: &str) -> Result<f64, FetchError> {
        Ok(42.0)
    }

    async fn fetch_exchange_rate(&self, _base: &Currency, _quote: &Currency) -> Result<f64, FetchError> {
        Ok(0.75)
    }
}

mod quote_source {
    use super::*;

    #[tokio::test]
    async fn trait_objects_are_usable() {
        let sources: Vec<Box<dyn QuoteSource>> = vec![
            Box::new(FixedSource),
            Box::new(AlphaVantageSource::new("demo")),
        ];
        assert_eq!(sources[0].name(), "Fixed");
        assert_eq!(sources[1].name(), "Alpha Vantage");
        assert_eq!(sources[0].fetch_price("ANY").await.unwrap(), 42.0);
        assert_eq!(
            sources[0]
                .fetch_exchange_rate(&Currency::cad(), &Currency::usd())
                .await
                .unwrap(),
            0.75
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_connection_error() {
        // Nothing listens on port 9 (discard) on loopback in a test sandbox.
        let source = AlphaVantageSource::new("secret-key").with_base_url("http://127.0.0.1:9/query");
        let err = source.fetch_price("AAPL").await.unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Connection);
        assert!(!err.to_string().contains("secret-key"));
    }

    #[tokio::test]
    async fn served_quote_is_parsed() {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{QUOTE_CSV}",
            QUOTE_CSV.len()
        );
        let source = AlphaVantageSource::new("secret-key").with_base_url(serve_once(response).await);
        assert_eq!(source.fetch_price("AAPL").await.unwrap(), 185.59);
    }

    #[tokio::test]
    async fn body_cut_short_is_unparseable() {
        let response = "HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort".to_string();
        let source = AlphaVantageSource::new("secret-key").with_base_url(serve_once(response).await);
        let err = source.fetch_price("AAPL").await.unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Unparseable);
        assert!(!err.to_string().contains("secret-key"));
    }

    #[tokio::test]
    async fn server_error_status_is_a_connection_error() {
        let response = "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n".to_string();
        let source = AlphaVantageSource::new("secret-key").with_base_url(serve_once(response).await);
        let err = source.fetch_price("AAPL").await.unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Connection);
        assert!(!err.to_string().contains("secret-key"));
    }

    #[test]
    fn alpha_vantage_takes_a_new_key() {
        let source = AlphaVantageSource::new("old").with_base_url("http://127.0.0.1:9/query");
        let rekeyed = source.rekeyed("new").unwrap();
        assert_eq!(rekeyed.name(), "Alpha Vantage");
    }

    #[test]
    fn keyless_source_is_not_rebuilt() {
        assert!(FixedSource.rekeyed("new").is_none());
    }
}
