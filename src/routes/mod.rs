//! HTTP handlers and the router that wires them together.
//!
//! - `browse`: folder chooser behind the *Browse Folder* button
//! - `export`: CSV/JSON download of a scan's results
//! - `health`: liveness, readiness, metrics, version
//! - `scanner_info`: which scanner binary is used and whether it runs
//! - `scans`: start, list, cancel, live events and results of scans

use std::path::PathBuf;

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::compression::predicate::{DefaultPredicate, Predicate};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::{middleware, state::AppState};

pub mod browse;
pub mod export;
pub mod health;
pub mod scanner_info;
pub mod scans;

/// Compression, but never for SSE: compressed event streams stall in browsers.
#[derive(Clone)]
struct NoSseDefault(DefaultPredicate);

impl Predicate for NoSseDefault {
    fn should_compress<B: axum::body::HttpBody>(&self, res: &axum::http::Response<B>) -> bool {
        let is_sse = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.starts_with("text/event-stream"))
            .unwrap_or(false);
        !is_sse && self.0.should_compress(res)
    }
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
        .route("/scanner", get(scanner_info::scanner_info))
        .route("/browse", get(browse::browse))
        .route("/scans", post(scans::create_scan).get(scans::list_scans))
        .route("/scans/{id}", get(scans::get_scan).delete(scans::cancel_scan))
        .route("/scans/{id}/events", get(scans::scan_events))
        .route("/scans/{id}/results", get(scans::get_results))
        .route("/scans/{id}/export", get(export::export_scan))
}

/// Full application: API, optional static web UI (SPA fallback to `index.html`)
/// and the middleware stack.
pub fn build_app(state: AppState, ui: Option<(PathBuf, PathBuf)>) -> Router {
    let cfg = state.config.clone();
    let mut router = api_routes();
    if let Some((ui_root, ui_index)) = ui {
        let static_ui = ServeDir::new(ui_root)
            .append_index_html_on_directories(true)
            .not_found_service(ServeFile::new(ui_index));
        router = router.fallback_service(static_ui);
    }

    let app = router
        .with_state(state)
        .layer(DefaultBodyLimit::max(middleware::validation::max_body_size()))
        .layer(from_fn(middleware::validation::validate_request_middleware))
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(CompressionLayer::new().compress_when(NoSseDefault(DefaultPredicate::new())))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cfg, middleware::security_headers::security_headers_middleware));

    // Debug: permissiv für `dx serve` auf anderem Port; Release ist same-origin
    if cfg!(debug_assertions) {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}
