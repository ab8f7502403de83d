mod common;

use axum::http::StatusCode;
use chrono::{Duration, Local};
use serde_json::{json, Value};

use common::{request, test_app};

async fn create_class(app: &axum::Router, name: &str) -> String {
    let (status, class) = request(
        app,
        "POST",
        "/api/classes",
        Some(json!({ "name": name, "subject": "ELA" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    class["id"].as_str().expect("class id").to_string()
}

async fn create_activity(app: &axum::Router, class_id: &str, title: &str, date: &str) -> String {
    let (status, activity) = request(
        app,
        "POST",
        "/api/activities",
        Some(json!({ "classId": class_id, "title": title, "date": date })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    activity["id"].as_str().expect("activity id").to_string()
}

fn standard_id(standards: &[Value], code: &str) -> String {
    standards
        .iter()
        .find(|s| s["code"] == json!(code))
        .and_then(|s| s["id"].as_str())
        .unwrap_or_else(|| panic!("standard {} not in catalog", code))
        .to_string()
}

#[tokio::test]
async fn coverage_report_tracks_fresh_stale_and_missing() {
    let (app, _state) = test_app();
    let english = create_class(&app, "English-1").await;
    let _french = create_class(&app, "French-1").await;

    let (status, body) = request(
        &app,
        "POST",
        "/api/standards/import",
        Some(json!({
            "subject": "ELA",
            "standards": [
                { "gradeBand": "6-8", "code": "ELA.1", "description": "Cite textual evidence" },
                { "gradeBand": "6-8", "code": "ELA.2", "description": "Determine a theme" },
                { "gradeBand": "6-8", "code": "ELA.3", "description": "Analyze structure" },
            ],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["imported"], json!(3));

    let (_, catalog) = request(&app, "GET", "/api/standards?subject=ELA", None).await;
    let standards = catalog["standards"].as_array().expect("standards").clone();
    let s1 = standard_id(&standards, "ELA.1");
    let s2 = standard_id(&standards, "ELA.2");

    let today = Local::now().date_naive();
    let fresh = create_activity(&app, &english, "Evidence hunt", &today.to_string()).await;
    let old_date = (today - Duration::days(40)).to_string();
    let old = create_activity(&app, &english, "Theme circles", &old_date).await;

    for (activity, standard) in [(&fresh, &s1), (&old, &s2)] {
        let (status, tagged) = request(
            &app,
            "PUT",
            &format!("/api/activities/{}/tags", activity),
            Some(json!({ "standardIds": [standard] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tagged["taggedStandardIds"], json!([standard]));
    }

    let (status, report) = request(&app, "GET", "/api/standards/coverage", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["asOf"], json!(today.to_string()));

    let coverage = report["coverage"].as_array().expect("coverage");
    assert_eq!(coverage.len(), 2);

    let by_name = |name: &str| {
        coverage
            .iter()
            .find(|c| c["className"] == json!(name))
            .unwrap_or_else(|| panic!("no class {}", name))
    };

    let english_report = by_name("English-1");
    assert_eq!(english_report["totalStandards"], json!(3));
    assert_eq!(english_report["coveredCount"], json!(2));
    assert_eq!(english_report["coveragePct"], json!(67));
    let statuses: Vec<&Value> = english_report["standards"]
        .as_array()
        .expect("standards")
        .iter()
        .map(|s| &s["status"])
        .collect();
    assert_eq!(statuses[0], &json!("covered"));
    assert_eq!(statuses[1], &json!("stale"));
    assert_eq!(statuses[2], &json!("never_covered"));

    let french_report = by_name("French-1");
    assert_eq!(french_report["coveredCount"], json!(0));
    assert_eq!(french_report["coveragePct"], json!(0));
}

#[tokio::test]
async fn retagging_replaces_the_whole_set_and_drops_unknown_ids() {
    let (app, _state) = test_app();
    let class = create_class(&app, "English-1").await;

    let (_, _) = request(
        &app,
        "POST",
        "/api/standards/import",
        Some(json!({
            "subject": "ELA",
            "standards": [
                { "gradeBand": "6-8", "code": "ELA.1", "description": "Cite textual evidence" },
                { "gradeBand": "6-8", "code": "ELA.2", "description": "Determine a theme" },
            ],
        })),
    )
    .await;
    let (_, catalog) = request(&app, "GET", "/api/standards", None).await;
    let standards = catalog["standards"].as_array().expect("standards").clone();
    let s1 = standard_id(&standards, "ELA.1");
    let s2 = standard_id(&standards, "ELA.2");

    let today = Local::now().date_naive().to_string();
    let activity = create_activity(&app, &class, "Close reading", &today).await;

    let (_, tagged) = request(
        &app,
        "PUT",
        &format!("/api/activities/{}/tags", activity),
        Some(json!({ "standardIds": [s1, "made-up-id"] })),
    )
    .await;
    assert_eq!(tagged["taggedStandardIds"], json!([s1]));

    // replace, not merge
    let (_, tagged) = request(
        &app,
        "PUT",
        &format!("/api/activities/{}/tags", activity),
        Some(json!({ "standardIds": [s2] })),
    )
    .await;
    assert_eq!(tagged["taggedStandardIds"], json!([s2]));

    let (_, list) = request(&app, "GET", "/api/activities", None).await;
    let activities = list["activities"].as_array().expect("activities");
    assert_eq!(activities[0]["tagCount"], json!(1));
}

#[tokio::test]
async fn importing_a_subject_again_replaces_its_rows() {
    let (app, _state) = test_app();
    let class = create_class(&app, "English-1").await;

    let import = |codes: Vec<&str>| {
        let standards: Vec<Value> = codes
            .into_iter()
            .map(|c| json!({ "gradeBand": "6-8", "code": c, "description": format!("about {}", c) }))
            .collect();
        json!({ "subject": "ELA", "standards": standards })
    };

    let (_, _) = request(&app, "POST", "/api/standards/import", Some(import(vec!["ELA.1", "ELA.2"]))).await;
    let (_, catalog) = request(&app, "GET", "/api/standards", None).await;
    let standards = catalog["standards"].as_array().expect("standards").clone();
    let s1 = standard_id(&standards, "ELA.1");

    let today = Local::now().date_naive().to_string();
    let activity = create_activity(&app, &class, "Close reading", &today).await;
    let (_, _) = request(
        &app,
        "PUT",
        &format!("/api/activities/{}/tags", activity),
        Some(json!({ "standardIds": [s1] })),
    )
    .await;

    // re-import wipes the subject's rows and any tags pointing at them
    let (status, body) = request(&app, "POST", "/api/standards/import", Some(import(vec!["ELA.9"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["imported"], json!(1));

    let (_, catalog) = request(&app, "GET", "/api/standards", None).await;
    let codes: Vec<&Value> = catalog["standards"]
        .as_array()
        .expect("standards")
        .iter()
        .map(|s| &s["code"])
        .collect();
    assert_eq!(codes, vec![&json!("ELA.9")]);

    let (_, list) = request(&app, "GET", "/api/activities", None).await;
    assert_eq!(list["activities"][0]["tagCount"], json!(0));
}

#[tokio::test]
async fn import_rejects_empty_payloads() {
    let (app, _state) = test_app();
    let (status, _) = request(
        &app,
        "POST",
        "/api/standards/import",
        Some(json!({ "subject": "  ", "standards": [{ "gradeBand": "6-8", "code": "X", "description": "y" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(
        &app,
        "POST",
        "/api/standards/import",
        Some(json!({ "subject": "ELA", "standards": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
