//! Integration-style tests for the VirenWald backend.
//!
//! - **api_tests**: scan lifecycle over HTTP (start, conflict, cancel, results, export)
//! - **browse_api_tests**: folder chooser endpoint
//! - **config_tests**: configuration defaults, layering and validation
//! - **db_tests**: schema, cascades, startup recovery
//! - **error_tests**: `AppError` responses and validation helpers
//! - **health_api_tests**: health, metrics, version, scanner info
//!
//! No antivirus is needed: scans use [`FakeScanner`], the scanner endpoint
//! uses `/bin/sh` scripts.

pub mod browse_api_tests;
pub mod config_tests;
pub mod error_tests;
pub mod health_api_tests;

use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use http_body_util::BodyExt;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

use crate::{
    config::AppConfig,
    routes,
    scanner::{
        classify::{classify, FileVerdict},
        invoker::{FileScanner, ScannerCommand},
    },
    state::AppState,
};

/// Verdict by file name: `eicar*` infected, `broken*` error, everything else clean.
pub(crate) struct FakeScanner {
    pub calls: AtomicUsize,
    pub delay: Duration,
}

impl FakeScanner {
    pub fn new() -> Self {
        Self { calls: AtomicUsize::new(0), delay: Duration::ZERO }
    }

    pub fn slow(delay: Duration) -> Self {
        Self { calls: AtomicUsize::new(0), delay }
    }
}

#[async_trait]
impl FileScanner for FakeScanner {
    async fn scan_file(&self, path: &Path) -> FileVerdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        if name.starts_with("eicar") {
            classify(&format!("{}: Eicar-Test-Signature FOUND", path.display()))
        } else if name.starts_with("broken") {
            FileVerdict::error("Can't open file")
        } else {
            classify(&format!("{}: OK", path.display()))
        }
    }

    fn describe(&self) -> String {
        "fake-scanner".into()
    }
}

pub(crate) async fn test_state_with(scanner: Arc<dyn FileScanner>, command: ScannerCommand) -> AppState {
    let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
    crate::db::init_db(&pool).await.unwrap();

    let mut config = AppConfig::default();
    config.database.url = "sqlite::memory:".into();
    config.scanner.batch_size = 2;
    config.scanner.flush_interval_ms = 50;

    AppState::with_scanner(pool, config, command, scanner)
}

pub(crate) async fn test_app(scanner: Arc<dyn FileScanner>) -> (Router, AppState) {
    let command = ScannerCommand::new("clamscan", vec!["--no-summary".into()], Duration::from_secs(5));
    let state = test_state_with(scanner, command).await;
    (routes::build_app(state.clone(), None), state)
}

pub(crate) async fn send(app: &Router, req: Request<Body>) -> (axum::http::StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let body = res.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

pub(crate) async fn get_json(app: &Router, uri: &str) -> (axum::http::StatusCode, serde_json::Value) {
    let (status, _, body) = send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await;
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

pub(crate) async fn post_json(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
) -> (axum::http::StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _, body) = send(app, req).await;
    (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
}

/// Polls `/scans/{id}` until it leaves `running`.
pub(crate) async fn wait_for_finish(app: &Router, id: &str) -> serde_json::Value {
    for _ in 0..250 {
        let (_, scan) = get_json(app, &format!("/scans/{}", id)).await;
        if scan["status"] != "running" {
            return scan;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("scan {} did not finish in time", id);
}
