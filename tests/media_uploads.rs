mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use common::{request, test_app_in};

const BOUNDARY: &str = "homeroomd-test-boundary";

async fn upload(app: &axum::Router, file_name: &str, bytes: &[u8]) -> (StatusCode, Value) {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
             Content-Type: application/pdf\r\n\r\n",
            b = BOUNDARY,
            name = file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/api/media")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .expect("request build");

    let response = app.clone().oneshot(request).await.expect("request");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn upload_list_and_delete_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, _state) = test_app_in(dir.path().to_path_buf());

    let (status, item) = upload(&app, "worksheet.pdf", b"%PDF-1.4 fake").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["fileName"], json!("worksheet.pdf"));
    assert_eq!(item["contentType"], json!("application/pdf"));
    assert_eq!(item["sizeBytes"], json!(13));
    let id = item["id"].as_str().expect("media id").to_string();

    let stored = dir.path().join("media").join(format!("{}-worksheet.pdf", id));
    assert!(stored.exists(), "upload lands under <data_dir>/media");

    let (status, list) = request(&app, "GET", "/api/media", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["media"].as_array().expect("media").len(), 1);

    let (status, _) = request(&app, "DELETE", &format!("/api/media/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!stored.exists(), "delete removes the stored file");

    let (status, _) = request(&app, "DELETE", &format!("/api/media/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn file_names_are_sanitized_for_storage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, _state) = test_app_in(dir.path().to_path_buf());

    let (status, item) = upload(&app, "lab notes (draft).pdf", b"data").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["fileName"], json!("lab_notes__draft_.pdf"));
}

#[tokio::test]
async fn empty_uploads_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, _state) = test_app_in(dir.path().to_path_buf());

    let (status, body) = upload(&app, "empty.pdf", b"").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}
