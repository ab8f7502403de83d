use std::collections::HashSet;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ai::{self, RetryPolicy};
use crate::api::error::ApiError;
use crate::api::{build_generator, SharedState};
use crate::context;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub class_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateActivity {
    pub class_id: String,
    pub title: String,
    pub date: Option<String>,
    pub activity_type: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateActivity {
    pub title: Option<String>,
    pub date: Option<String>,
    pub activity_type: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceTags {
    pub standard_ids: Vec<String>,
}

/// Shape the auto-tagger asks the model for.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutotagResponse {
    standard_ids: Vec<String>,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/activities", get(list_activities).post(create_activity))
        .route(
            "/api/activities/{id}",
            patch(update_activity).delete(delete_activity),
        )
        .route("/api/activities/{id}/tags", put(replace_tags))
        .route("/api/activities/{id}/autotag", post(autotag_activity))
}

async fn list_activities(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let activities = state
        .db
        .call(move |conn| {
            let from = query.from.unwrap_or_else(|| "0000-01-01".to_string());
            let to = query.to.unwrap_or_else(|| "9999-12-31".to_string());
            let mut sql = String::from(
                "SELECT a.id, a.class_id, c.name, a.date, a.title, a.activity_type, a.notes,
                        (SELECT COUNT(*) FROM activity_standard_tags t WHERE t.activity_id = a.id)
                 FROM activities a JOIN classes c ON c.id = a.class_id
                 WHERE (a.date IS NULL OR (a.date >= ? AND a.date <= ?))",
            );
            let mut params: Vec<String> = vec![from, to];
            if let Some(class_id) = query.class_id {
                sql.push_str(" AND a.class_id = ?");
                params.push(class_id);
            }
            sql.push_str(" ORDER BY a.date IS NULL, a.date, a.title");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    Ok(json!({
                        "id": row.get::<_, String>(0)?,
                        "classId": row.get::<_, String>(1)?,
                        "className": row.get::<_, String>(2)?,
                        "date": row.get::<_, Option<String>>(3)?,
                        "title": row.get::<_, String>(4)?,
                        "activityType": row.get::<_, String>(5)?,
                        "notes": row.get::<_, Option<String>>(6)?,
                        "tagCount": row.get::<_, i64>(7)?,
                    }))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;
    Ok(Json(json!({ "activities": activities })))
}

async fn create_activity(
    State(state): State<SharedState>,
    Json(payload): Json<CreateActivity>,
) -> Result<Json<Value>, ApiError> {
    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }

    let row = state
        .db
        .call(move |conn| {
            let class_exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM classes WHERE id = ?",
                    [&payload.class_id],
                    |r| r.get(0),
                )
                .optional()?;
            if class_exists.is_none() {
                anyhow::bail!("class not found");
            }

            let id = Uuid::new_v4().to_string();
            let activity_type = payload.activity_type.unwrap_or_else(|| "lesson".to_string());
            conn.execute(
                "INSERT INTO activities(id, class_id, date, title, activity_type, notes)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &payload.class_id,
                    &payload.date,
                    &title,
                    &activity_type,
                    &payload.notes,
                ),
            )?;
            Ok(json!({
                "id": id,
                "classId": payload.class_id,
                "date": payload.date,
                "title": title,
                "activityType": activity_type,
                "notes": payload.notes,
            }))
        })
        .await
        .map_err(not_found_or_internal)?;
    Ok(Json(row))
}

async fn update_activity(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateActivity>,
) -> Result<Json<Value>, ApiError> {
    let updated = state
        .db
        .call(move |conn| {
            let existing: Option<(Option<String>, String, String, Option<String>)> = conn
                .query_row(
                    "SELECT date, title, activity_type, notes FROM activities WHERE id = ?",
                    [&id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
                )
                .optional()?;
            let Some((date, title, activity_type, notes)) = existing else {
                return Ok(None);
            };

            let title = match payload.title {
                Some(t) if !t.trim().is_empty() => t.trim().to_string(),
                _ => title,
            };
            let date = payload.date.or(date);
            let activity_type = payload.activity_type.unwrap_or(activity_type);
            let notes = payload.notes.or(notes);

            conn.execute(
                "UPDATE activities SET date = ?, title = ?, activity_type = ?, notes = ? WHERE id = ?",
                (&date, &title, &activity_type, &notes, &id),
            )?;
            Ok(Some(json!({
                "id": id,
                "date": date,
                "title": title,
                "activityType": activity_type,
                "notes": notes,
            })))
        })
        .await?;

    updated
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("activity not found".to_string()))
}

async fn delete_activity(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state
        .db
        .call(move |conn| {
            conn.execute(
                "DELETE FROM activity_standard_tags WHERE activity_id = ?",
                [&id],
            )?;
            Ok(conn.execute("DELETE FROM activities WHERE id = ?", [&id])?)
        })
        .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("activity not found".to_string()));
    }
    Ok(Json(json!({ "ok": true })))
}

/// Replace the activity's standard tag set wholesale. Tags are never
/// updated in place; a retag deletes and re-creates the rows.
async fn replace_tags(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<ReplaceTags>,
) -> Result<Json<Value>, ApiError> {
    let tagged = apply_tags(&state, id, payload.standard_ids, "teacher").await?;
    Ok(Json(json!({ "taggedStandardIds": tagged })))
}

async fn autotag_activity(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let lookup_id = id.clone();
    let (activity, catalog) = state
        .db
        .call(move |conn| {
            let activity: Option<(String, Option<String>, String)> = conn
                .query_row(
                    "SELECT a.title, a.notes, c.subject
                     FROM activities a JOIN classes c ON c.id = a.class_id
                     WHERE a.id = ?",
                    [&lookup_id],
                    |r| {
                        Ok((
                            r.get(0)?,
                            r.get(1)?,
                            r.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        ))
                    },
                )
                .optional()?;
            let subject_filter = activity
                .as_ref()
                .map(|(_, _, s)| s.clone())
                .filter(|s| !s.is_empty());
            let catalog = context::load_standards(conn, subject_filter.as_deref())?;
            Ok((activity, catalog))
        })
        .await?;

    let Some((title, notes, _)) = activity else {
        return Err(ApiError::NotFound("activity not found".to_string()));
    };
    if catalog.is_empty() {
        return Err(ApiError::BadRequest(
            "no standards imported to tag against".to_string(),
        ));
    }

    let mut catalog_text = String::new();
    for s in &catalog {
        catalog_text.push_str(&format!("{}\t{}\t{}\n", s.id, s.code, s.description));
    }
    let system = "You map classroom activities to curriculum standards. \
        Reply with JSON only: {\"standardIds\": [\"...\"]}. Choose at most 4 \
        standards, using ids from the provided catalog.";
    let user = format!(
        "Activity: {}\nNotes: {}\n\nCatalog (id, code, description):\n{}",
        title,
        notes.unwrap_or_default(),
        catalog_text
    );

    let generator = build_generator(&state).await?;
    let parsed: AutotagResponse =
        ai::generate_json(generator.as_ref(), &RetryPolicy::default(), system, &user, 1024).await?;

    // Drop hallucinated ids before touching the tag table.
    let known: HashSet<&str> = catalog.iter().map(|s| s.id.as_str()).collect();
    let ids: Vec<String> = parsed
        .standard_ids
        .into_iter()
        .filter(|id| known.contains(id.as_str()))
        .collect();

    let tagged = apply_tags(&state, id, ids, "ai").await?;
    Ok(Json(json!({ "taggedStandardIds": tagged })))
}

async fn apply_tags(
    state: &SharedState,
    activity_id: String,
    standard_ids: Vec<String>,
    tagged_by: &'static str,
) -> Result<Vec<String>, ApiError> {
    state
        .db
        .call(move |conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM activities WHERE id = ?",
                    [&activity_id],
                    |r| r.get(0),
                )
                .optional()?;
            if exists.is_none() {
                anyhow::bail!("activity not found");
            }

            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM activity_standard_tags WHERE activity_id = ?",
                [&activity_id],
            )?;
            let mut inserted = Vec::new();
            for standard_id in standard_ids {
                let known: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM standards WHERE id = ?",
                        [&standard_id],
                        |r| r.get(0),
                    )
                    .optional()?;
                if known.is_none() {
                    continue;
                }
                tx.execute(
                    "INSERT OR IGNORE INTO activity_standard_tags(activity_id, standard_id, tagged_by)
                     VALUES(?, ?, ?)",
                    (&activity_id, &standard_id, tagged_by),
                )?;
                inserted.push(standard_id);
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
        .map_err(not_found_or_internal)
}

fn not_found_or_internal(e: anyhow::Error) -> ApiError {
    let msg = e.to_string();
    if msg.contains("not found") {
        ApiError::NotFound(msg)
    } else {
        ApiError::Internal(msg)
    }
}
