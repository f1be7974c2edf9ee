use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

/// Shown whenever a scan is requested for something that is not a folder.
pub const INVALID_FOLDER_MESSAGE: &str = "Please select a valid folder.";

/// Error type of the HTTP handlers.
///
/// Every variant maps to one status code and a stable `code` in the JSON body:
/// `{ "error": { code, message, details? }, status, timestamp }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Unexpected failures; logged with an id, the cause never leaves the server.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// A scan for the same folder is already running.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Validation error on field '{field}': {message}")]
    ValidationError { field: String, message: String },
    #[error("I/O error: {0}")]
    IoError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidInput(_) | AppError::ValidationError { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) | AppError::Database(_) | AppError::IoError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::ValidationError { .. } => "VALIDATION_ERROR",
            AppError::IoError(_) => "IO_ERROR",
        }
    }

    /// Client-facing message and optional details. Server-side failures are
    /// logged here and replaced by a generic text.
    fn public_parts(self) -> (String, Option<Value>) {
        match self {
            AppError::Internal(e) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!(error_id = %error_id, error = ?e, "internal error");
                ("An internal server error occurred".into(), Some(json!({ "error_id": error_id.to_string() })))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "database error");
                ("A database error occurred".into(), Some(json!({ "details": msg })))
            }
            AppError::IoError(msg) => {
                tracing::error!(error = %msg, "i/o error");
                ("An I/O error occurred".into(), Some(json!({ "details": msg })))
            }
            AppError::ValidationError { field, message } => (
                format!("Validation failed for field '{}'", field),
                Some(json!({ "field": field, "message": message })),
            ),
            AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::ServiceUnavailable(msg)
            | AppError::InvalidInput(msg) => (msg, None),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let (message, details) = self.public_parts();

        let mut error = json!({ "code": code, "message": message });
        if let Some(details) = details {
            error["details"] = details;
        }
        let body = json!({
            "error": error,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::PoolTimedOut => AppError::ServiceUnavailable("Database is busy, try again".to_string()),
            sqlx::Error::Database(db_err) => AppError::Database(db_err.message().to_string()),
            other => AppError::Database(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(format!("{}: {}", err.kind(), err))
    }
}

impl From<globset::Error> for AppError {
    fn from(err: globset::Error) -> Self {
        AppError::InvalidInput(format!("Invalid exclude pattern: {}", err))
    }
}

pub type AppResult<T> = Result<T, AppError>;

pub trait OptionExt<T> {
    /// `None` becomes `AppError::NotFound("<entity> not found")`.
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(format!("{} not found", entity)))
    }
}

/// Request validation helpers shared by the handlers.
pub mod validation {
    use super::*;
    use std::path::{Path, PathBuf};

    /// Accepts only an existing directory; everything else is the
    /// "Please select a valid folder." error.
    pub fn validate_scan_root(path: &str) -> AppResult<PathBuf> {
        let trimmed = path.trim();
        if trimmed.is_empty() || trimmed.contains('\0') {
            return Err(AppError::BadRequest(INVALID_FOLDER_MESSAGE.to_string()));
        }
        let p = Path::new(trimmed);
        if !crate::scanner::walker::is_valid_root(p) {
            return Err(AppError::BadRequest(INVALID_FOLDER_MESSAGE.to_string()));
        }
        // Canonical form so two spellings of one folder collide in the running-scan check.
        // Windows: canonicalize liefert \\?\-Pfade, die clamscan nicht mag.
        #[cfg(not(windows))]
        let p = std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
        #[cfg(windows)]
        let p = p.to_path_buf();
        Ok(p)
    }

    pub fn validate_positive_number(value: Option<i64>, field: &str) -> AppResult<()> {
        if let Some(v) = value {
            if v <= 0 {
                return Err(AppError::ValidationError {
                    field: field.to_string(),
                    message: format!("Value must be positive, got {}", v),
                });
            }
        }
        Ok(())
    }
}
