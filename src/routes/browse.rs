use std::path::{Path, PathBuf};

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult, INVALID_FOLDER_MESSAGE},
    middleware::ip::{extract_ip_from_headers, MaybeRemoteAddr},
    middleware::validation::validate_file_path,
    state::AppState,
    types::{BrowseEntry, BrowseResponse},
};

#[derive(Debug, Default, Deserialize)]
pub struct BrowseQuery {
    pub path: Option<String>,
}

/// Folder chooser: sub-directories of `path`, or the filesystem roots without it.
pub async fn browse(
    State(state): State<AppState>,
    maybe_remote: MaybeRemoteAddr,
    headers: HeaderMap,
    Query(q): Query<BrowseQuery>,
) -> AppResult<Response> {
    let ip = extract_ip_from_headers(&headers, maybe_remote.ip());
    if let Err((status, body)) = state.rate_limiter.check_endpoint_limit("/browse", ip).await {
        return Ok((status, body).into_response());
    }

    let Some(raw) = q.path.as_deref().filter(|p| !p.trim().is_empty()) else {
        let entries = tokio::task::spawn_blocking(list_roots).await.map_err(|e| AppError::Internal(e.into()))?;
        return Ok(Json(BrowseResponse { path: None, parent: None, entries }).into_response());
    };

    let path = validate_file_path(raw).map_err(|(_, body)| {
        AppError::InvalidInput(body.0["error"]["message"].as_str().unwrap_or("Invalid path").to_string())
    })?;
    let dir = PathBuf::from(&path);
    let listing = tokio::task::spawn_blocking(move || list_subdirs(&dir))
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    let entries = match listing {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::BadRequest(INVALID_FOLDER_MESSAGE.into()));
        }
        Err(e) => return Err(e.into()),
    };

    let parent = Path::new(&path).parent().map(|p| p.to_string_lossy().to_string()).filter(|p| !p.is_empty());
    Ok(Json(BrowseResponse { path: Some(path), parent, entries }).into_response())
}

fn list_subdirs(dir: &Path) -> std::io::Result<Vec<BrowseEntry>> {
    if !dir.is_dir() {
        return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"));
    }
    let mut entries: Vec<BrowseEntry> = std::fs::read_dir(dir)?
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| BrowseEntry {
            name: e.file_name().to_string_lossy().to_string(),
            path: e.path().to_string_lossy().to_string(),
        })
        .collect();
    entries.sort_by_key(|e| e.name.to_lowercase());
    Ok(entries)
}

#[cfg(windows)]
fn list_roots() -> Vec<BrowseEntry> {
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::{GetDriveTypeW, GetLogicalDrives};

    let mut items = Vec::new();
    // SAFETY: plain Win32 queries, the wide string outlives the call
    unsafe {
        let mask = GetLogicalDrives();
        if mask == 0 {
            tracing::error!("GetLogicalDrives failed");
            return items;
        }
        for i in 0..26u32 {
            if (mask & (1u32 << i)) == 0 {
                continue;
            }
            let letter = (b'A' + (i as u8)) as char;
            let path = format!("{}:\\", letter);
            let w: Vec<u16> = path.encode_utf16().chain(std::iter::once(0)).collect();
            // 0 = unknown, 1 = no root dir
            let dtype = GetDriveTypeW(PCWSTR(w.as_ptr()));
            if dtype == 0 || dtype == 1 {
                continue;
            }
            items.push(BrowseEntry { name: format!("{}:", letter), path });
        }
    }
    items
}

#[cfg(not(windows))]
fn list_roots() -> Vec<BrowseEntry> {
    let mut items = vec![BrowseEntry { name: "/".into(), path: "/".into() }];
    if let Some(home) = std::env::var_os("HOME").filter(|h| !h.is_empty()) {
        let home = PathBuf::from(home);
        if home.is_dir() {
            items.push(BrowseEntry { name: "Home".into(), path: home.to_string_lossy().to_string() });
        }
    }
    items
}
