//! End-to-end runner tests with a stubbed fetch collaborator

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use sitewatch::{
    run_site_check, Capabilities, CheckEngine, Fetch, FetchResult, HistoryStore, Result,
    WatchError,
};

/// Canned fetch responses for runner tests
struct StubFetcher {
    body: Vec<u8>,
    status: u16,
    content_type: Option<String>,
    fail: bool,
}

impl StubFetcher {
    fn ok(body: &[u8], status: u16) -> Self {
        Self {
            body: body.to_vec(),
            status,
            content_type: Some("text/html".to_string()),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            body: Vec::new(),
            status: 0,
            content_type: None,
            fail: true,
        }
    }
}

#[async_trait]
impl Fetch for StubFetcher {
    async fn fetch(&self, url: &str, _verify_tls: bool) -> Result<FetchResult> {
        if self.fail {
            return Err(WatchError::FetchFailed {
                attempts: 3,
                message: "connection refused".to_string(),
            });
        }
        let mut headers = HashMap::new();
        if let Some(ct) = &self.content_type {
            headers.insert("Content-Type".to_string(), ct.clone());
        }
        Ok(FetchResult {
            body: self.body.clone(),
            headers,
            status: self.status,
            final_url: url.to_string(),
        })
    }
}

fn write_config(dir: &std::path::Path, sites: serde_json::Value) -> PathBuf {
    let path = dir.join("watch.json");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(sites.to_string().as_bytes()).unwrap();
    path
}

fn html_site() -> serde_json::Value {
    serde_json::json!({
        "page": {
            "url": "https://example.org/",
            "content_kind": "html"
        }
    })
}

fn engine() -> CheckEngine {
    CheckEngine::new(Capabilities::detect())
}

#[tokio::test]
async fn test_clean_run_returns_zero_and_updates_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), html_site());
    let store = HistoryStore::new(dir.path().join("state"));
    let fetcher = StubFetcher::ok(b"<html><body>ok</body></html>", 200);

    let code = run_site_check(&fetcher, &store, &engine(), "page", Some(config.as_path()), true).await;
    assert_eq!(code, 0);

    let record = store.record("page").unwrap();
    assert_eq!(record.last_size, 28);
    assert_eq!(record.last_checksum.len(), 64);
    assert_eq!(record.checksum_history.len(), 1);
}

#[tokio::test]
async fn test_unchanged_rerun_stays_zero_with_single_history_entry() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), html_site());
    let store = HistoryStore::new(dir.path().join("state"));
    let fetcher = StubFetcher::ok(b"<html><body>ok</body></html>", 200);

    let first = run_site_check(&fetcher, &store, &engine(), "page", Some(config.as_path()), true).await;
    let second = run_site_check(&fetcher, &store, &engine(), "page", Some(config.as_path()), true).await;
    assert_eq!(first, 0);
    assert_eq!(second, 0);
    assert_eq!(store.record("page").unwrap().checksum_history.len(), 1);
}

#[tokio::test]
async fn test_unknown_site_fails_without_touching_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), html_site());
    let store = HistoryStore::new(dir.path().join("state"));
    let fetcher = StubFetcher::ok(b"x", 200);

    let code = run_site_check(&fetcher, &store, &engine(), "nope", Some(config.as_path()), true).await;
    assert_eq!(code, 3);
    assert!(!store.metrics_path().exists());
}

#[tokio::test]
async fn test_missing_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::new(dir.path().join("state"));
    let fetcher = StubFetcher::ok(b"x", 200);
    let missing = dir.path().join("absent.json");

    let code = run_site_check(&fetcher, &store, &engine(), "page", Some(missing.as_path()), true).await;
    assert_eq!(code, 3);
}

#[tokio::test]
async fn test_fetch_failure_fails_without_history_update() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), html_site());
    let store = HistoryStore::new(dir.path().join("state"));
    let fetcher = StubFetcher::failing();

    let code = run_site_check(&fetcher, &store, &engine(), "page", Some(config.as_path()), true).await;
    assert_eq!(code, 3);
    assert!(store.record("page").is_none());
}

#[tokio::test]
async fn test_http_error_status_fails_but_still_records_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), html_site());
    let store = HistoryStore::new(dir.path().join("state"));
    let fetcher = StubFetcher::ok(b"gateway timeout", 504);

    let code = run_site_check(&fetcher, &store, &engine(), "page", Some(config.as_path()), true).await;
    assert_eq!(code, 3);
    assert!(store.record("page").is_some());
}

#[tokio::test]
async fn test_min_bytes_failure_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        serde_json::json!({
            "page": {
                "url": "https://example.org/",
                "content_kind": "html",
                "min_bytes": 1000
            }
        }),
    );
    let store = HistoryStore::new(dir.path().join("state"));
    let fetcher = StubFetcher::ok(b"tiny", 200);

    let code = run_site_check(&fetcher, &store, &engine(), "page", Some(config.as_path()), true).await;
    assert_eq!(code, 3);
}

#[tokio::test]
async fn test_anomaly_returns_warn() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), html_site());
    let store = HistoryStore::new(dir.path().join("state"));
    // Seed a previous observation: 1000 bytes, different content
    store.update("page", "previous-checksum", 1000, None, 10).unwrap();

    let fetcher = StubFetcher::ok(&vec![b'x'; 400], 200);
    let code = run_site_check(&fetcher, &store, &engine(), "page", Some(config.as_path()), true).await;
    assert_eq!(code, 2);

    // The anomaly run still replaced the stored observation
    let record = store.record("page").unwrap();
    assert_eq!(record.last_size, 400);
}

#[tokio::test]
async fn test_csv_schema_failure_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        serde_json::json!({
            "feed": {
                "url": "https://example.org/feed.csv",
                "content_kind": "csv",
                "expected_columns": ["date", "value", "series"]
            }
        }),
    );
    let store = HistoryStore::new(dir.path().join("state"));
    let fetcher = StubFetcher::ok(b"date,value\n2026-01-01,1\n", 200);

    let code = run_site_check(&fetcher, &store, &engine(), "feed", Some(config.as_path()), true).await;
    assert_eq!(code, 3);
}

#[tokio::test]
async fn test_csv_run_records_row_count() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        serde_json::json!({
            "feed": {
                "url": "https://example.org/feed.csv",
                "content_kind": "csv",
                "expected_columns": ["date", "value"]
            }
        }),
    );
    let store = HistoryStore::new(dir.path().join("state"));
    let fetcher = StubFetcher::ok(b"date,value\n2026-01-01,1\n2026-01-02,2\n", 200);

    let code = run_site_check(&fetcher, &store, &engine(), "feed", Some(config.as_path()), true).await;
    assert_eq!(code, 0);
    assert_eq!(store.record("feed").unwrap().last_row_count, Some(2));
}

#[tokio::test]
async fn test_skipped_excel_schema_does_not_fail_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        serde_json::json!({
            "sheet": {
                "url": "https://example.org/report.xlsx",
                "content_kind": "excel",
                "expected_columns": ["Date", "Value"]
            }
        }),
    );
    let store = HistoryStore::new(dir.path().join("state"));
    let fetcher = StubFetcher::ok(b"opaque workbook bytes", 200);
    let engine = CheckEngine::new(Capabilities {
        html_selectors: true,
        excel: false,
    });

    let code = run_site_check(&fetcher, &store, &engine, "sheet", Some(config.as_path()), true).await;
    assert_eq!(code, 0);
}

#[tokio::test]
async fn test_live_mode_without_channels_falls_back_to_console() {
    // dry_run = false with no resolvable channel: the console fallback is
    // the only side effect and the code is still severity-derived.
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), html_site());
    let store = HistoryStore::new(dir.path().join("state"));
    let fetcher = StubFetcher::ok(b"<html><body>ok</body></html>", 200);

    let code = run_site_check(&fetcher, &store, &engine(), "page", Some(config.as_path()), false).await;
    assert_eq!(code, 0);
}

#[tokio::test]
async fn test_dry_run_still_persists_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), html_site());
    let store = HistoryStore::new(dir.path().join("state"));
    let fetcher = StubFetcher::ok(b"<html></html>", 200);

    run_site_check(&fetcher, &store, &engine(), "page", Some(config.as_path()), true).await;
    assert!(store.metrics_path().exists());
}
