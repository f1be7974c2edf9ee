#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };

    use crate::routes::build_app;
    use crate::scanner::invoker::ScannerCommand;
    use crate::tests::{get_json, send, test_app, test_state_with, FakeScanner};

    #[tokio::test]
    async fn test_healthz_endpoint() {
        let (app, _) = test_app(Arc::new(FakeScanner::new())).await;
        let (status, _, body) = send(&app, Request::builder().uri("/healthz").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_readyz_endpoint_ok() {
        let (app, _) = test_app(Arc::new(FakeScanner::new())).await;
        let (status, _, body) = send(&app, Request::builder().uri("/readyz").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"ready");
    }

    #[tokio::test]
    async fn test_version_endpoint() {
        let (app, _) = test_app(Arc::new(FakeScanner::new())).await;
        let (status, v) = get_json(&app, "/version").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["name"], "virenwald");
        assert!(!v["version"].as_str().unwrap().is_empty());
        assert!(v["build"]["os"].is_string());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, state) = test_app(Arc::new(FakeScanner::new())).await;
        state.metrics.inc_scans_started();

        let (status, m) = get_json(&app, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(m["scans_started"], 1);
        assert_eq!(m["files_infected"], 0);
        assert!(m["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn test_metrics_prometheus_endpoint() {
        let (app, _) = test_app(Arc::new(FakeScanner::new())).await;
        let (status, headers, body) =
            send(&app, Request::builder().uri("/metrics/prometheus").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers["content-type"].to_str().unwrap().starts_with("text/plain"));
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("# TYPE virenwald_scans_started counter"));
        assert!(text.contains("virenwald_files_infected 0"));
        assert!(text.contains("# TYPE virenwald_uptime_seconds gauge"));
    }

    #[tokio::test]
    async fn test_security_headers_present() {
        let (app, _) = test_app(Arc::new(FakeScanner::new())).await;
        let (_, headers, _) = send(&app, Request::builder().uri("/metrics").body(Body::empty()).unwrap()).await;
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
        assert_eq!(headers["cache-control"], "no-store");
        assert!(headers.get("strict-transport-security").is_none());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (app, _) = test_app(Arc::new(FakeScanner::new())).await;
        let (status, body) = get_json(&app, "/scans/..%2f..%2fetc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_PATH");
    }

    #[tokio::test]
    async fn test_scanner_info_missing_binary() {
        let command = ScannerCommand::new(
            "virenwald-scanner-that-does-not-exist",
            vec!["--no-summary".into()],
            Duration::from_secs(5),
        );
        let state = test_state_with(Arc::new(FakeScanner::new()), command).await;
        let app = build_app(state, None);

        let (status, info) = get_json(&app, "/scanner").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["available"], false);
        assert_eq!(info["binary"], "virenwald-scanner-that-does-not-exist");
        assert_eq!(info["args"][0], "--no-summary");
        assert!(info["error"].as_str().unwrap().contains("failed to start scanner"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scanner_info_reports_version() {
        let command = ScannerCommand::new(
            "/bin/sh",
            vec!["-c".into(), "echo 'ClamAV 1.3.1/27400/Mon Sep 30 2024'".into()],
            Duration::from_secs(5),
        );
        let state = test_state_with(Arc::new(FakeScanner::new()), command).await;
        let app = build_app(state, None);

        let (status, info) = get_json(&app, "/scanner").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["available"], true);
        assert_eq!(info["version"], "ClamAV 1.3.1/27400/Mon Sep 30 2024");
        assert!(info["error"].is_null());
    }
}
