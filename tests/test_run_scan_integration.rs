//! Integration tests for run_scan function
//!
//! These tests drive the whole pipeline (background router, proxying content
//! client, early-blur guard, page scanner, file storage) against a mock API.

use std::io::Write;

use serde_json::json;
use tempfile::{NamedTempFile, TempDir};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use media_guard::dom::ImageState;
use media_guard::{run_scan, Config, LogFormat, LogLevel};

/// Helper function to write a page to a temporary file (sync I/O)
fn write_page(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    write!(file, "<html><head></head><body>{}</body></html>", body).expect("Failed to write page");
    file.flush().expect("Failed to flush file");
    file
}

/// Helper function to create a basic Config for testing
fn create_test_config(page: &NamedTempFile, page_url: &str, api_base: &str) -> Config {
    Config {
        page: page.path().to_string_lossy().to_string(),
        page_url: Some(page_url.to_string()),
        api_base: api_base.to_string(),
        token: Some("test-token".to_string()),
        log_level: LogLevel::Error, // Reduce noise in tests
        log_format: LogFormat::Plain,
        scan_delay_ms: 0,
        timeout_seconds: 5,
        ..Default::default()
    }
}

async fn mount_api(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/media/.*"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(b"jpeg-bytes".as_slice()),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/predict"))
        .and(wiremock::matchers::body_string_contains("bad.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "classes": ["0", "3"],
            "probabilities": [0.2, 0.91],
            "active": ["3"]
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/predict"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "classes": ["0", "3"],
            "probabilities": [0.01, 0.02],
            "active": []
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/statistics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalBlocked": 10, "todayBlocked": 0, "weeklyBlocked": 4
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_run_scan_classifies_page_images() {
    let server = MockServer::start().await;
    mount_api(&server).await;
    let media = format!("{}/media", server.uri());
    let page = write_page(&format!(
        r#"<img src="{media}/bad.jpg" width="300" height="200">
           <img src="{media}/good.jpg" width="300" height="200">
           <img src="{media}/icon.jpg" width="16" height="16">"#
    ));

    let report = run_scan(create_test_config(&page, "https://example.com/", &server.uri()))
        .await
        .expect("scan should succeed");

    assert_eq!(report.summary.scanned, 2);
    assert_eq!(report.summary.blocked, 1);
    assert_eq!(report.summary.allowed, 1);
    assert_eq!(report.summary.skipped, 1);
    let states: Vec<ImageState> = report.images.iter().map(|i| i.state).collect();
    assert_eq!(
        states,
        vec![ImageState::Blocked, ImageState::Allowed, ImageState::Unprocessed]
    );
    // Server figures refreshed at startup, plus the block of this scan
    let counters = report.counters.expect("counters");
    assert_eq!(counters.total, 11);
    assert_eq!(counters.weekly, 5);
    assert_eq!(report.failures, 0);
}

#[tokio::test]
async fn test_run_scan_without_token_scans_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let page = write_page(r#"<img src="https://cdn.example.com/a.jpg" width="300" height="200">"#);
    let config = Config {
        token: None,
        ..create_test_config(&page, "https://example.com/", &server.uri())
    };

    let report = run_scan(config).await.expect("scan should succeed");
    assert_eq!(report.summary.scanned, 0);
    assert_eq!(report.images[0].state, ImageState::Unprocessed);
}

#[tokio::test]
async fn test_run_scan_persists_counters_in_storage_dir() {
    let server = MockServer::start().await;
    mount_api(&server).await;
    let storage_dir = TempDir::new().expect("Failed to create temp directory");
    let media = format!("{}/media", server.uri());
    let page = write_page(&format!(r#"<img src="{media}/bad.jpg" width="300" height="200">"#));

    let config = Config {
        storage_dir: Some(storage_dir.path().to_path_buf()),
        ..create_test_config(&page, "https://example.com/", &server.uri())
    };
    run_scan(config).await.expect("scan should succeed");

    let sync = std::fs::read_to_string(storage_dir.path().join("sync.json")).unwrap();
    let sync: serde_json::Value = serde_json::from_str(&sync).unwrap();
    assert_eq!(sync["totalBlocked"], 11);
    let local = std::fs::read_to_string(storage_dir.path().join("local.json")).unwrap();
    assert!(local.contains("test-token"));
}

#[tokio::test]
async fn test_run_scan_rejects_inverted_thresholds() {
    let page = write_page("");
    let config = Config {
        block_threshold: 0.3,
        warn_threshold: 0.6,
        ..create_test_config(&page, "https://example.com/", "http://127.0.0.1:9")
    };
    let err = run_scan(config).await.unwrap_err();
    assert!(format!("{:#}", err).contains("Invalid scan configuration"));
}

#[tokio::test]
async fn test_run_scan_missing_page_fails() {
    let config = Config {
        page: "/nonexistent/page.html".to_string(),
        page_url: None,
        ..Default::default()
    };
    assert!(run_scan(config).await.is_err());
}
