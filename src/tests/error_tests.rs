#[cfg(test)]
mod tests {
    use crate::error::{validation, AppError, AppResult, OptionExt, INVALID_FOLDER_MESSAGE};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use http_body_util::BodyExt;
    use std::io;

    async fn body_json(error: AppError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let error = AppError::BadRequest("Invalid input".to_string());
        assert_eq!(format!("{}", error), "Bad request: Invalid input");

        let error = AppError::NotFound("scan not found".to_string());
        assert_eq!(format!("{}", error), "Not found: scan not found");

        let error = AppError::Conflict("already running".to_string());
        assert_eq!(format!("{}", error), "Conflict: already running");
    }

    #[test]
    fn test_app_error_into_response() {
        let cases = vec![
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (AppError::ServiceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::IoError("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let (status, body) = body_json(AppError::BadRequest(INVALID_FOLDER_MESSAGE.into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(body["error"]["message"], "Please select a valid folder.");
        assert_eq!(body["status"], 400);
        assert!(body["timestamp"].is_string());
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn test_internal_error_hides_cause() {
        let (status, body) = body_json(AppError::Internal(anyhow::anyhow!("secret stack detail"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert!(!body.to_string().contains("secret stack detail"));
        assert!(body["error"]["details"]["error_id"].is_string());
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let app_error: AppError = io_error.into();

        match app_error {
            AppError::IoError(msg) => {
                assert!(msg.contains("File not found"));
            }
            _ => panic!("Expected IoError variant"),
        }
    }

    #[test]
    fn test_from_sqlx_row_not_found() {
        let app_error: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(app_error, AppError::NotFound(_)));
    }

    #[test]
    fn test_from_globset_error() {
        let glob_result = globset::Glob::new("[invalid");
        assert!(glob_result.is_err());

        let app_error: AppError = glob_result.unwrap_err().into();
        match app_error {
            AppError::InvalidInput(msg) => {
                assert!(msg.contains("Invalid exclude pattern"));
            }
            _ => panic!("Expected InvalidInput variant"),
        }
    }

    #[test]
    fn test_option_ext() {
        let some_value: Option<i32> = Some(42);
        let result: AppResult<i32> = some_value.ok_or_not_found("scan");
        assert_eq!(result.unwrap(), 42);

        let none_value: Option<i32> = None;
        match none_value.ok_or_not_found("scan").unwrap_err() {
            AppError::NotFound(msg) => assert_eq!(msg, "scan not found"),
            _ => panic!("Expected NotFound error"),
        }
    }

    #[test]
    fn test_validate_scan_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();

        let root = validation::validate_scan_root(&format!("  {}  ", dir.path().display())).unwrap();
        assert!(root.is_dir());

        for bad in [
            "".to_string(),
            "   ".to_string(),
            file.to_string_lossy().to_string(),
            dir.path().join("missing").to_string_lossy().to_string(),
        ] {
            match validation::validate_scan_root(&bad).unwrap_err() {
                AppError::BadRequest(msg) => assert_eq!(msg, INVALID_FOLDER_MESSAGE),
                other => panic!("Expected BadRequest, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validation::validate_positive_number(Some(1), "limit").is_ok());
        assert!(validation::validate_positive_number(None, "limit").is_ok());

        match validation::validate_positive_number(Some(-5), "limit").unwrap_err() {
            AppError::ValidationError { field, message } => {
                assert_eq!(field, "limit");
                assert!(message.contains("must be positive"));
                assert!(message.contains("-5"));
            }
            _ => panic!("Expected ValidationError"),
        }
    }
}
