//! End-to-end HTTP contract tests driving the router in-process against a
//! temp-directory store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt;

use csvserve::config::ServerConfig;
use csvserve::server::{router, AppState};
use csvserve::storage::Store;

fn test_app(dir: &TempDir) -> Router {
    let config = ServerConfig {
        http_port: 0,
        db_path: dir.path().join("uploaded_csv.db"),
        upload_dir: dir.path().join("uploads"),
    };
    std::fs::create_dir_all(&config.upload_dir).unwrap();
    let store = Store::new(&config.db_path);
    store.initialize().unwrap();
    router(AppState { store, config: Arc::new(config) })
}

/// Helper to create a multipart body for file upload.
fn multipart_body(field: &str, filename: Option<&str>, content: &[u8]) -> (String, Vec<u8>) {
    let boundary = "----TestBoundary1234567890";
    let mut body = Vec::new();

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    match filename {
        Some(name) => body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n", field, name).as_bytes(),
        ),
        None => body
            .extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n", field).as_bytes()),
    }
    body.extend_from_slice(b"Content-Type: text/csv\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    (boundary.to_string(), body)
}

async fn upload(app: &Router, filename: Option<&str>, content: &[u8]) -> (StatusCode, String) {
    upload_field(app, "file", filename, content).await
}

async fn upload_field(
    app: &Router,
    field: &str,
    filename: Option<&str>,
    content: &[u8],
) -> (StatusCode, String) {
    let (boundary, body) = multipart_body(field, filename, content);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload_csv")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn query(app: &Router, sql: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/query")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!("sql={}", urlencoding::encode(sql))))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn query_json(app: &Router, sql: &str) -> Value {
    let (status, body) = query(app, sql).await;
    assert_eq!(status, StatusCode::OK, "query failed: {}", body);
    serde_json::from_str(&body).unwrap()
}

#[tokio::test]
async fn landing_page_serves_html() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("<form"));
    assert!(body.contains("/upload_csv"));
}

#[tokio::test]
async fn upload_then_select_returns_identity_and_values() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, body) = upload(&app, Some("one.csv"), b"A,B\nx,y\n").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "File uploaded successfully");

    let result = query_json(&app, "SELECT * FROM uploaded_data").await;
    assert_eq!(result, json!({ "result": [[1, "x", "y"]] }));

    // The raw file is kept under the upload directory.
    assert!(dir.path().join("uploads/one.csv").exists());
}

#[tokio::test]
async fn missing_file_part_is_rejected_without_touching_store() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, body) = upload_field(&app, "attachment", Some("one.csv"), b"A\nx\n").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "No file part");

    let result = query_json(&app, "SELECT COUNT(*) FROM uploaded_data").await;
    assert_eq!(result, json!({ "result": [[0]] }));
}

#[tokio::test]
async fn empty_filename_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, body) = upload(&app, Some(""), b"A\nx\n").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "No selected file");
}

#[tokio::test]
async fn overlapping_uploads_merge_schema_with_null_backfill() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, _) = upload(&app, Some("one.csv"), b"A,B\na1,b1\n").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = upload(&app, Some("two.csv"), b"B,C\nb2,c2\n").await;
    assert_eq!(status, StatusCode::OK);

    // Schema is identity plus first-seen column order.
    let schema = query_json(&app, "SELECT name FROM pragma_table_info('uploaded_data')").await;
    assert_eq!(schema, json!({ "result": [["id"], ["A"], ["B"], ["C"]] }));

    // Earlier rows are NULL in later columns and vice versa.
    let rows = query_json(&app, "SELECT * FROM uploaded_data ORDER BY id").await;
    assert_eq!(
        rows,
        json!({ "result": [[1, "a1", "b1", null], [2, null, "b2", "c2"]] })
    );
}

#[tokio::test]
async fn unnamed_artifact_column_is_never_stored() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, _) = upload(&app, Some("indexed.csv"), b"Unnamed: 0,A\n0,x\n").await;
    assert_eq!(status, StatusCode::OK);

    let schema = query_json(&app, "SELECT name FROM pragma_table_info('uploaded_data')").await;
    assert_eq!(schema, json!({ "result": [["id"], ["A"]] }));
    let rows = query_json(&app, "SELECT * FROM uploaded_data").await;
    assert_eq!(rows, json!({ "result": [[1, "x"]] }));
}

#[tokio::test]
async fn malformed_file_reports_500_and_leaves_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, _) = upload(&app, Some("ok.csv"), b"A,B\nx,y\n").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = upload(&app, Some("bad.csv"), b"A,B\nonly-one-field\n").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("Error uploading file:"), "unexpected body: {}", body);

    let schema = query_json(&app, "SELECT name FROM pragma_table_info('uploaded_data')").await;
    assert_eq!(schema, json!({ "result": [["id"], ["A"], ["B"]] }));
    let count = query_json(&app, "SELECT COUNT(*) FROM uploaded_data").await;
    assert_eq!(count, json!({ "result": [[1]] }));
}

#[tokio::test]
async fn query_error_returns_500_with_error_text() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, body) = query(&app, "SELECT * FROM missing_table").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("Error executing query:"), "unexpected body: {}", body);
    assert!(body.contains("no such table"), "unexpected body: {}", body);
}

#[tokio::test]
async fn mutation_statements_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, _) = upload(&app, Some("one.csv"), b"A\nx\n").await;
    assert_eq!(status, StatusCode::OK);

    let result = query_json(&app, "DELETE FROM uploaded_data").await;
    assert_eq!(result, json!({ "result": [] }));
    let count = query_json(&app, "SELECT COUNT(*) FROM uploaded_data").await;
    assert_eq!(count, json!({ "result": [[0]] }));
}
