use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

// Liveness - lightweight, polled by the desktop shell on startup
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// Readiness: DB must answer within 5 s
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let query = sqlx::query("SELECT 1").fetch_one(&state.db);
    match tokio::time::timeout(std::time::Duration::from_secs(5), query).await {
        Ok(Ok(_)) => (StatusCode::OK, "ready").into_response(),
        Ok(Err(e)) => (StatusCode::SERVICE_UNAVAILABLE, format!("not ready: {}", e)).into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready: timeout").into_response(),
    }
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.get_snapshot())
}

fn prom_metric(out: &mut String, name: &str, kind: &str, help: &str, value: impl std::fmt::Display) {
    out.push_str(&format!(
        "# HELP virenwald_{name} {help}\n# TYPE virenwald_{name} {kind}\nvirenwald_{name} {value}\n"
    ));
}

// Prometheus text exposition format
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.metrics.get_snapshot();
    let mut body = String::new();
    prom_metric(&mut body, "scans_started", "counter", "Total scans started", m.scans_started);
    prom_metric(&mut body, "scans_completed", "counter", "Total scans completed", m.scans_completed);
    prom_metric(&mut body, "scans_failed", "counter", "Total scans failed", m.scans_failed);
    prom_metric(&mut body, "scans_cancelled", "counter", "Total scans cancelled", m.scans_cancelled);
    prom_metric(&mut body, "files_scanned", "counter", "Files handed to the scanner", m.files_scanned);
    prom_metric(&mut body, "files_clean", "counter", "Files reported clean", m.files_clean);
    prom_metric(&mut body, "files_infected", "counter", "Files reported infected", m.files_infected);
    prom_metric(&mut body, "files_error", "counter", "Files that could not be scanned", m.files_error);
    prom_metric(&mut body, "warnings_count", "counter", "Walk warnings", m.warnings_count);
    prom_metric(&mut body, "uptime_seconds", "gauge", "Uptime seconds", m.uptime_seconds);
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

pub async fn version() -> impl IntoResponse {
    let body = serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "authors": env!("CARGO_PKG_AUTHORS"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }
    });
    (StatusCode::OK, Json(body))
}
