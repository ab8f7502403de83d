use axum::extract::{Path, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::SharedState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClass {
    pub name: String,
    pub subject: Option<String>,
    pub period: Option<String>,
    pub color: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClass {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub period: Option<String>,
    pub color: Option<String>,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/classes", get(list_classes).post(create_class))
        .route("/api/classes/{id}", patch(update_class).delete(delete_class))
}

async fn list_classes(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let classes = state
        .db
        .call(|conn| {
            // Include activity counts so the dashboard has something to show.
            // Correlated subquery avoids double-counting from joins.
            let mut stmt = conn.prepare(
                "SELECT
                   c.id, c.name, c.subject, c.period, c.color,
                   (SELECT COUNT(*) FROM activities a WHERE a.class_id = c.id) AS activity_count
                 FROM classes c
                 ORDER BY c.name",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(json!({
                        "id": row.get::<_, String>(0)?,
                        "name": row.get::<_, String>(1)?,
                        "subject": row.get::<_, Option<String>>(2)?,
                        "period": row.get::<_, Option<String>>(3)?,
                        "color": row.get::<_, Option<String>>(4)?,
                        "activityCount": row.get::<_, i64>(5)?,
                    }))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;
    Ok(Json(json!({ "classes": classes })))
}

async fn create_class(
    State(state): State<SharedState>,
    Json(payload): Json<CreateClass>,
) -> Result<Json<Value>, ApiError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }

    let row = state
        .db
        .call(move |conn| {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO classes(id, name, subject, period, color) VALUES(?, ?, ?, ?, ?)",
                (
                    &id,
                    &name,
                    &payload.subject,
                    &payload.period,
                    &payload.color,
                ),
            )?;
            Ok(json!({
                "id": id,
                "name": name,
                "subject": payload.subject,
                "period": payload.period,
                "color": payload.color,
            }))
        })
        .await?;
    Ok(Json(row))
}

async fn update_class(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateClass>,
) -> Result<Json<Value>, ApiError> {
    let updated = state
        .db
        .call(move |conn| {
            let existing: Option<(String, Option<String>, Option<String>, Option<String>)> = conn
                .query_row(
                    "SELECT name, subject, period, color FROM classes WHERE id = ?",
                    [&id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
                )
                .optional()?;
            let Some((name, subject, period, color)) = existing else {
                return Ok(None);
            };

            let name = match payload.name {
                Some(n) if !n.trim().is_empty() => n.trim().to_string(),
                _ => name,
            };
            let subject = payload.subject.or(subject);
            let period = payload.period.or(period);
            let color = payload.color.or(color);

            conn.execute(
                "UPDATE classes SET name = ?, subject = ?, period = ?, color = ? WHERE id = ?",
                (&name, &subject, &period, &color, &id),
            )?;
            Ok(Some(json!({
                "id": id,
                "name": name,
                "subject": subject,
                "period": period,
                "color": color,
            })))
        })
        .await?;

    updated
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("class not found".to_string()))
}

async fn delete_class(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .db
        .call(move |conn| {
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM classes WHERE id = ?", [&id], |r| r.get(0))
                .optional()?;
            if exists.is_none() {
                anyhow::bail!("class not found");
            }

            // Owned rows go; class-optional rows are unscoped instead of
            // deleted. Dependency order matters, there is no ON DELETE CASCADE.
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM activity_standard_tags
                 WHERE activity_id IN (SELECT id FROM activities WHERE class_id = ?)",
                [&id],
            )?;
            tx.execute("DELETE FROM activities WHERE class_id = ?", [&id])?;
            tx.execute("UPDATE tasks SET class_id = NULL WHERE class_id = ?", [&id])?;
            tx.execute(
                "UPDATE calendar_events SET class_id = NULL WHERE class_id = ?",
                [&id],
            )?;
            tx.execute(
                "UPDATE bellringers SET class_id = NULL WHERE class_id = ?",
                [&id],
            )?;
            tx.execute(
                "UPDATE lesson_plans SET class_id = NULL WHERE class_id = ?",
                [&id],
            )?;
            tx.execute("DELETE FROM classes WHERE id = ?", [&id])?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| {
            if e.to_string().contains("not found") {
                ApiError::NotFound("class not found".to_string())
            } else {
                ApiError::Internal(e.to_string())
            }
        })?;
    Ok(Json(json!({ "ok": true })))
}
