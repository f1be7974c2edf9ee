use axum::{extract::State, response::IntoResponse, Json};

use crate::{state::AppState, types::ScannerInfo};

/// Which scanner binary would run, and whether it answers `--version`.
pub async fn scanner_info(State(state): State<AppState>) -> impl IntoResponse {
    let cmd = &state.scanner_command;
    let (available, version, error) = match cmd.version().await {
        Ok(v) => (true, Some(v).filter(|v| !v.is_empty()), None),
        Err(e) => {
            tracing::warn!(binary = %cmd.binary().display(), error = %e, "scanner not available");
            (false, None, Some(e.to_string()))
        }
    };
    Json(ScannerInfo {
        binary: cmd.binary().display().to_string(),
        args: cmd.args().to_vec(),
        available,
        version,
        error,
    })
}
