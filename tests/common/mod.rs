use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;

use homeroomd::api::{self, AppState, SharedState};
use homeroomd::config::Config;
use homeroomd::db::{self, DbHandle};

/// Router over a fresh in-memory database, plus the state for tests that
/// need to seed rows directly.
pub fn test_app() -> (Router, SharedState) {
    test_app_in(std::env::temp_dir().join("homeroomd-tests"))
}

/// Same, with an explicit data directory for tests that touch disk.
pub fn test_app_in(data_dir: std::path::PathBuf) -> (Router, SharedState) {
    let conn = db::open_in_memory().expect("in-memory db");
    let state: SharedState = Arc::new(AppState {
        db: DbHandle::new(conn),
        config: Config {
            data_dir,
            port: 0,
            ai_provider: None,
            anthropic_api_key: None,
            openai_api_key: None,
        },
    });
    (api::router(state.clone()), state)
}

pub async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string())),
        None => builder.body(Body::empty()),
    }
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

/// GET a page as raw text, for the public HTML routes.
pub async fn request_page(app: &Router, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request build");
    let response = app.clone().oneshot(request).await.expect("request");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    (status, String::from_utf8_lossy(&bytes).to_string())
}
