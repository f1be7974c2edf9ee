use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::{Component, Path};

type Rejection = (StatusCode, Json<serde_json::Value>);

const MAX_PATH_LENGTH: usize = 4096;
const MAX_ALLOWED_DEPTH: u32 = 256;
const MAX_EXCLUDE_PATTERNS: usize = 256;

fn reject(status: StatusCode, code: &str, message: impl Into<String>) -> Rejection {
    (
        status,
        Json(json!({
            "error": { "code": code, "message": message.into() },
            "status": status.as_u16(),
        })),
    )
}

/// Rejects traversal sequences in the URI and oversized POST bodies early.
///
/// The body limit follows `VIRENWALD_MAX_BODY_SIZE` (default 10 MiB, clamped
/// to 1..50 MiB), the same value `DefaultBodyLimit` gets in `routes::build_app`.
pub async fn validate_request_middleware(req: Request, next: Next) -> Response {
    if contains_path_traversal(req.uri().path()) {
        return reject(StatusCode::BAD_REQUEST, "INVALID_PATH", "Path traversal detected in request")
            .into_response();
    }

    if matches!(req.method(), &Method::POST | &Method::PUT) {
        let length = req
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<usize>().ok());
        let max = max_body_size();
        if let Some(length) = length.filter(|l| *l > max) {
            tracing::debug!(length, max, "request body too large");
            return reject(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                format!("Request body exceeds maximum size of {} bytes", max),
            )
            .into_response();
        }
    }

    next.run(req).await
}

pub fn max_body_size() -> usize {
    std::env::var("VIRENWALD_MAX_BODY_SIZE")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(10 * 1024 * 1024)
        .clamp(1024 * 1024, 50 * 1024 * 1024)
}

fn contains_path_traversal(path: &str) -> bool {
    let lower = path.to_lowercase();

    if path.contains("/..") || path.contains("\\..") || path.starts_with("..") {
        return true;
    }
    if path.contains("/./") || path.contains("\\.\\") || path.contains("....") {
        return true;
    }

    // URL-encoded variants, single and double encoded
    const ENCODED: [&str; 11] = [
        "%2e%2e", "%252e%252e", "%2e/", "%252e%2f", "/%2e", "%2f%2e", "%2e\\", "%2e%5c", "%5c%2e", "%5c%5c",
        "%00",
    ];
    if ENCODED.iter().any(|p| lower.contains(p)) {
        return true;
    }

    path.contains('\0')
}

/// True if one of the path's components is `..`. Names that merely contain
/// dots (`..snapshots`, `a....b`) are ordinary folders.
fn has_parent_component(path: &str) -> bool {
    // Backslash auch auf Unix als Trenner werten, sonst rutscht `a\..\b` durch
    Path::new(path).components().any(|c| matches!(c, Component::ParentDir))
        || path.split(['/', '\\']).any(|segment| segment == "..")
}

/// Checks a user supplied folder path before it touches the filesystem.
pub fn validate_file_path(path: &str) -> Result<String, Rejection> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "INVALID_PATH", "Path must not be empty"));
    }
    if trimmed.contains('\0') {
        return Err(reject(StatusCode::BAD_REQUEST, "INVALID_PATH", "Path contains null byte"));
    }
    if has_parent_component(trimmed) {
        return Err(reject(StatusCode::BAD_REQUEST, "PATH_TRAVERSAL", "Path traversal attempt detected"));
    }
    if trimmed.len() > MAX_PATH_LENGTH {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "PATH_TOO_LONG",
            format!("Path exceeds maximum length of {} characters", MAX_PATH_LENGTH),
        ));
    }

    #[cfg(windows)]
    {
        const INVALID_CHARS: &[char] = &['<', '>', '"', '|', '?', '*'];
        let extended = trimmed.starts_with("\\\\?\\");
        if let Some(c) = INVALID_CHARS.iter().find(|c| trimmed.contains(**c)) {
            if !extended {
                return Err(reject(
                    StatusCode::BAD_REQUEST,
                    "INVALID_PATH_CHARS",
                    format!("Path contains invalid character: {}", c),
                ));
            }
        }
        // Doppelpunkt nur nach Laufwerksbuchstabe (C:) oder in UNC/Extended-Pfaden
        let colons = trimmed.matches(':').count();
        let is_drive_path = trimmed.len() >= 2 && trimmed.chars().nth(1) == Some(':');
        if colons > 1 || (colons == 1 && !is_drive_path && !extended && !trimmed.starts_with("\\\\")) {
            return Err(reject(StatusCode::BAD_REQUEST, "INVALID_PATH_CHARS", "Invalid use of colon in path"));
        }
    }

    Ok(trimmed.to_string())
}

pub fn validate_scan_options(max_depth: Option<u32>, excludes: Option<&[String]>) -> Result<(), Rejection> {
    if let Some(depth) = max_depth.filter(|d| *d > MAX_ALLOWED_DEPTH) {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "INVALID_DEPTH",
            format!("Max depth {} exceeds maximum allowed value of {}", depth, MAX_ALLOWED_DEPTH),
        ));
    }
    if let Some(ex) = excludes.filter(|ex| ex.len() > MAX_EXCLUDE_PATTERNS) {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "TOO_MANY_EXCLUDES",
            format!("{} exclude patterns given, at most {} allowed", ex.len(), MAX_EXCLUDE_PATTERNS),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_traversal() {
        assert!(contains_path_traversal("../etc/passwd"));
        assert!(contains_path_traversal("/scans/../etc"));
        assert!(contains_path_traversal("%2e%2e/etc"));
        assert!(contains_path_traversal("a\0b"));

        assert!(!contains_path_traversal("/scans/3f1e/results"));
        assert!(!contains_path_traversal("C:\\Users\\test"));
    }

    #[test]
    fn file_path_rules() {
        assert_eq!(validate_file_path("  /home/user/Downloads ").unwrap(), "/home/user/Downloads");
        assert!(validate_file_path("C:\\Users\\test").is_ok());
        assert!(validate_file_path("").is_err());
        assert!(validate_file_path("/home/../etc").is_err());
        assert!(validate_file_path("..").is_err());
        assert!(validate_file_path("C:\\Users\\..\\Admin").is_err());
        assert!(validate_file_path(&"a".repeat(5000)).is_err());

        #[cfg(windows)]
        {
            assert!(validate_file_path("C:\\file<name>").is_err());
            assert!(validate_file_path("C:\\a:b").is_err());
        }
    }

    #[test]
    fn dotted_folder_names_are_not_traversal() {
        for ok in ["/data/..snapshots", "/srv/a....b", "/home/user/./Downloads", "/mnt/backup..old/", "C:\\x\\.hidden"] {
            assert_eq!(validate_file_path(ok).unwrap(), ok, "{} was rejected", ok);
        }
    }

    #[test]
    fn scan_option_bounds() {
        assert!(validate_scan_options(None, None).is_ok());
        assert!(validate_scan_options(Some(10), Some(&["*.iso".to_string()])).is_ok());
        assert!(validate_scan_options(Some(MAX_ALLOWED_DEPTH + 1), None).is_err());
        let many: Vec<String> = (0..=MAX_EXCLUDE_PATTERNS).map(|i| format!("*.{}", i)).collect();
        let (status, body) = validate_scan_options(None, Some(&many)).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.0["error"]["code"], "TOO_MANY_EXCLUDES");
    }
}
