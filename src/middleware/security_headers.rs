//! Security and caching headers for every response.

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::{AppConfig, SecurityConfig};

const DEFAULT_HSTS_MAX_AGE: u64 = 31_536_000;

/// Adds the fixed header set plus optional HSTS/CSP from `[security]`.
///
/// Scan data (JSON, SSE, CSV exports) is marked `no-store` since results of a
/// folder scan are sensitive; wasm/js/css of the UI may be cached long-term.
pub async fn security_headers_middleware(
    State(cfg): State<Arc<AppConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    for (name, value) in [
        ("x-content-type-options", "nosniff"),
        ("x-frame-options", "SAMEORIGIN"),
        ("referrer-policy", "no-referrer"),
        ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
        ("cross-origin-opener-policy", "same-origin"),
        ("cross-origin-resource-policy", "same-origin"),
    ] {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    if let Some(sec) = cfg.security.as_ref() {
        apply_configured(headers, sec);
    }

    let content_type = headers.get(CONTENT_TYPE).and_then(|ct| match ct.to_str() {
        Ok(s) => Some(s.to_string()),
        Err(e) => {
            tracing::warn!("Invalid UTF-8 in Content-Type header: {}", e);
            None
        }
    });
    if let Some(ct) = content_type.as_deref() {
        apply_cache_policy(headers, ct);
    }

    res
}

fn apply_configured(headers: &mut HeaderMap, sec: &SecurityConfig) {
    if sec.enable_hsts.unwrap_or(false) {
        let max_age = sec.hsts_max_age.unwrap_or(DEFAULT_HSTS_MAX_AGE);
        let include_sub = if sec.hsts_include_subdomains.unwrap_or(false) { "; includeSubDomains" } else { "" };
        let value = format!("max-age={}{}", max_age, include_sub);
        headers.insert(
            HeaderName::from_static("strict-transport-security"),
            HeaderValue::from_str(&value).unwrap_or(HeaderValue::from_static("max-age=31536000")),
        );
    }
    if let Some(csp) = sec.csp.as_deref().filter(|c| !c.trim().is_empty()) {
        if let Ok(val) = HeaderValue::from_str(csp) {
            headers.insert(HeaderName::from_static("content-security-policy"), val);
        }
    }
}

fn apply_cache_policy(headers: &mut HeaderMap, ct: &str) {
    let is_sse = ct.starts_with("text/event-stream");
    let is_data = ct.starts_with("application/json") || ct.starts_with("text/csv") || is_sse;
    if is_data {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        if is_sse {
            // Proxies must not buffer the event stream
            headers.insert(HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"));
        }
        return;
    }
    let is_asset = ct.starts_with("text/css")
        || ct.starts_with("application/javascript")
        || ct.starts_with("text/javascript")
        || ct.starts_with("application/wasm");
    if is_asset {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=31536000, immutable"));
        headers.remove(PRAGMA);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_exports_are_not_cached() {
        let mut h = HeaderMap::new();
        apply_cache_policy(&mut h, "text/csv; charset=utf-8");
        assert_eq!(h.get(CACHE_CONTROL).unwrap(), "no-store");
        assert!(h.get("x-accel-buffering").is_none());
    }

    #[test]
    fn sse_disables_proxy_buffering() {
        let mut h = HeaderMap::new();
        apply_cache_policy(&mut h, "text/event-stream");
        assert_eq!(h.get("x-accel-buffering").unwrap(), "no");
    }

    #[test]
    fn wasm_is_cached_long_term() {
        let mut h = HeaderMap::new();
        h.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        apply_cache_policy(&mut h, "application/wasm");
        assert_eq!(h.get(CACHE_CONTROL).unwrap(), "public, max-age=31536000, immutable");
        assert!(h.get(PRAGMA).is_none());
    }

    #[test]
    fn hsts_and_csp_from_config() {
        let mut h = HeaderMap::new();
        let sec = SecurityConfig {
            enable_hsts: Some(true),
            hsts_max_age: Some(600),
            hsts_include_subdomains: Some(true),
            csp: Some("default-src 'self'".into()),
        };
        apply_configured(&mut h, &sec);
        assert_eq!(h.get("strict-transport-security").unwrap(), "max-age=600; includeSubDomains");
        assert_eq!(h.get("content-security-policy").unwrap(), "default-src 'self'");
    }
}
