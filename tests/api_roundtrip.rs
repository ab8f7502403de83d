mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{request, test_app};

#[tokio::test]
async fn health_reports_ok() {
    let (app, _state) = test_app();
    let (status, body) = request(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
}

#[tokio::test]
async fn task_lifecycle_with_class_and_date_resolution() {
    let (app, _state) = test_app();

    let (status, class) = request(
        &app,
        "POST",
        "/api/classes",
        Some(json!({ "name": "English-1", "subject": "ELA" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let class_id = class["id"].as_str().expect("class id").to_string();

    // "e1" resolves through the class list, ISO dates pass through
    let (status, task) = request(
        &app,
        "POST",
        "/api/tasks",
        Some(json!({
            "title": "Grade the essays",
            "due": "2030-05-01",
            "class": "e1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["dueDate"], json!("2030-05-01"));
    assert_eq!(task["classId"], json!(class_id));
    assert_eq!(task["completed"], json!(false));
    let task_id = task["id"].as_str().expect("task id").to_string();

    let (status, list) = request(&app, "GET", "/api/tasks", None).await;
    assert_eq!(status, StatusCode::OK);
    let tasks = list["tasks"].as_array().expect("tasks array");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["className"], json!("English-1"));

    let (status, updated) = request(
        &app,
        "PATCH",
        &format!("/api/tasks/{}", task_id),
        Some(json!({ "completed": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["completed"], json!(true));

    let (status, _) = request(&app, "DELETE", &format!("/api/tasks/{}", task_id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = request(&app, "DELETE", &format!("/api/tasks/{}", task_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unresolvable_phrases_leave_the_task_unscoped() {
    let (app, _state) = test_app();
    let (status, task) = request(
        &app,
        "POST",
        "/api/tasks",
        Some(json!({
            "title": "Order lab supplies",
            "due": "whenever",
            "class": "general",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["dueDate"], json!(null));
    assert_eq!(task["classId"], json!(null));
}

#[tokio::test]
async fn blank_titles_are_rejected() {
    let (app, _state) = test_app();
    for uri in ["/api/tasks", "/api/classes", "/api/lesson-plans"] {
        let (status, body) = request(&app, "POST", uri, Some(json!({ "title": "  ", "name": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri {}", uri);
        assert!(body["error"].is_string(), "uri {}", uri);
    }
}

#[tokio::test]
async fn calendar_dates_must_be_iso() {
    let (app, _state) = test_app();
    let (status, body) = request(
        &app,
        "POST",
        "/api/calendar",
        Some(json!({ "title": "Fire drill", "date": "next friday" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("date must be YYYY-MM-DD"));

    let (status, event) = request(
        &app,
        "POST",
        "/api/calendar",
        Some(json!({ "title": "Fire drill", "date": "2030-09-12", "startTime": "10:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(event["kind"], json!("event"));

    // range filter excludes it
    let (status, list) = request(
        &app,
        "GET",
        "/api/calendar?from=2030-10-01&to=2030-10-31",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(list["events"].as_array().expect("events").is_empty());

    let (status, list) = request(
        &app,
        "GET",
        "/api/calendar?from=2030-09-01&to=2030-09-30",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["events"].as_array().expect("events").len(), 1);
}

#[tokio::test]
async fn deleting_a_class_unscopes_its_tasks() {
    let (app, _state) = test_app();
    let (_, class) = request(
        &app,
        "POST",
        "/api/classes",
        Some(json!({ "name": "French-1" })),
    )
    .await;
    let class_id = class["id"].as_str().expect("class id").to_string();

    let (_, task) = request(
        &app,
        "POST",
        "/api/tasks",
        Some(json!({ "title": "Prep vocab quiz", "class": "f1" })),
    )
    .await;
    assert_eq!(task["classId"], json!(class_id));

    let (status, _) = request(&app, "DELETE", &format!("/api/classes/{}", class_id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = request(&app, "GET", "/api/tasks", None).await;
    let tasks = list["tasks"].as_array().expect("tasks");
    assert_eq!(tasks.len(), 1, "task survives its class");
    assert_eq!(tasks[0]["classId"], json!(null));

    let (status, _) = request(&app, "DELETE", &format!("/api/classes/{}", class_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_ids_yield_not_found() {
    let (app, _state) = test_app();
    for (method, uri) in [
        ("PATCH", "/api/tasks/nope"),
        ("PATCH", "/api/classes/nope"),
        ("PATCH", "/api/calendar/nope"),
        ("PATCH", "/api/activities/nope"),
        ("GET", "/api/lesson-plans/nope"),
        ("GET", "/api/subdash/nope"),
    ] {
        let (status, body) = request(&app, method, uri, Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, uri);
        assert!(body["error"].is_string(), "{} {}", method, uri);
    }
}

#[tokio::test]
async fn settings_never_echo_api_keys() {
    let (app, _state) = test_app();
    let (status, body) = request(
        &app,
        "PUT",
        "/api/settings",
        Some(json!({
            "ai.provider": "anthropic",
            "ai.anthropicApiKey": "sk-secret-value",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], json!(2));

    let (status, body) = request(&app, "GET", "/api/settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settings"]["ai.provider"], json!("anthropic"));
    // key presence is reported as a boolean, never the value
    assert_eq!(body["settings"]["ai.anthropicApiKey"], json!(true));

    let (status, body) = request(
        &app,
        "PUT",
        "/api/settings",
        Some(json!({ "ai.provider": 42 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn generation_without_an_api_key_is_an_error_not_fabrication() {
    let (app, _state) = test_app();

    let (status, body) = request(
        &app,
        "POST",
        "/api/bellringers/generate",
        Some(json!({ "date": "2030-05-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["error"],
        json!("no API key configured for provider anthropic")
    );

    // nothing was persisted
    let (_, list) = request(&app, "GET", "/api/bellringers", None).await;
    assert!(list["bellringers"].as_array().expect("bellringers").is_empty());

    let (status, body) = request(&app, "POST", "/api/subdash/generate", Some(json!({}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("no API key"));
}

#[tokio::test]
async fn profile_roundtrips_as_string_pairs() {
    let (app, _state) = test_app();
    let (status, body) = request(
        &app,
        "PUT",
        "/api/profile",
        Some(json!({ "Room": "214", "Emergency contact": "Front office x100" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], json!(2));

    let (status, body) = request(&app, "GET", "/api/profile", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile"]["Room"], json!("214"));
    assert_eq!(
        body["profile"]["Emergency contact"],
        json!("Front office x100")
    );
}
