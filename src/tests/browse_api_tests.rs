#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;

    use crate::tests::{get_json, test_app, FakeScanner};

    #[tokio::test]
    async fn test_browse_without_path_lists_roots() {
        let (app, _) = test_app(Arc::new(FakeScanner::new())).await;
        let (status, body) = get_json(&app, "/browse").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["path"].is_null());
        #[cfg(not(windows))]
        assert_eq!(body["entries"][0]["path"], "/");
    }

    #[tokio::test]
    async fn test_browse_lists_subdirectories() {
        let (app, _) = test_app(Arc::new(FakeScanner::new())).await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("photos")).unwrap();
        std::fs::create_dir(dir.path().join("Downloads")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let uri = format!("/browse?path={}", dir.path().to_string_lossy());
        let (status, body) = get_json(&app, &uri).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["entries"].as_array().unwrap().iter().map(|e| e["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Downloads", "photos"]);
        assert!(body["parent"].is_string());
    }

    #[tokio::test]
    async fn test_browse_missing_folder() {
        let (app, _) = test_app(Arc::new(FakeScanner::new())).await;
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("/browse?path={}", dir.path().join("gone").to_string_lossy());
        let (status, body) = get_json(&app, &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Please select a valid folder.");
    }

    #[tokio::test]
    async fn test_browse_rejects_traversal() {
        let (app, _) = test_app(Arc::new(FakeScanner::new())).await;
        let (status, _) = get_json(&app, "/browse?path=/tmp/../etc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
