use axum::extract::{Path, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::{today, SharedState};
use crate::{context, resolve};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTask {
    pub title: String,
    pub notes: Option<String>,
    /// Natural-language due phrase ("fri", "next tuesday", "3/14").
    pub due: Option<String>,
    /// Free-text class reference ("e1", "english", "general").
    pub class: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTask {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub due: Option<String>,
    pub completed: Option<bool>,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", patch(update_task).delete(delete_task))
}

async fn list_tasks(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let tasks = state
        .db
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.title, t.notes, t.due_date, t.class_id, c.name, t.completed
                 FROM tasks t LEFT JOIN classes c ON c.id = t.class_id
                 ORDER BY t.completed, t.due_date IS NULL, t.due_date, t.created_at",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(json!({
                        "id": row.get::<_, String>(0)?,
                        "title": row.get::<_, String>(1)?,
                        "notes": row.get::<_, Option<String>>(2)?,
                        "dueDate": row.get::<_, Option<String>>(3)?,
                        "classId": row.get::<_, Option<String>>(4)?,
                        "className": row.get::<_, Option<String>>(5)?,
                        "completed": row.get::<_, i64>(6)? != 0,
                    }))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;
    Ok(Json(json!({ "tasks": tasks })))
}

async fn create_task(
    State(state): State<SharedState>,
    Json(payload): Json<CreateTask>,
) -> Result<Json<Value>, ApiError> {
    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }

    let as_of = today();
    let row = state
        .db
        .call(move |conn| {
            // Unparseable phrases resolve to None rather than failing the
            // request; due date and class scope are both optional.
            let due_date = payload
                .due
                .as_deref()
                .and_then(|s| resolve::resolve_date(s, as_of))
                .map(|d| d.to_string());
            let class_id = match payload.class.as_deref() {
                Some(input) => {
                    let classes = context::load_classes(conn)?;
                    resolve::resolve_class(input, &classes)
                }
                None => None,
            };

            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO tasks(id, title, notes, due_date, class_id) VALUES(?, ?, ?, ?, ?)",
                (&id, &title, &payload.notes, &due_date, &class_id),
            )?;
            Ok(json!({
                "id": id,
                "title": title,
                "notes": payload.notes,
                "dueDate": due_date,
                "classId": class_id,
                "completed": false,
            }))
        })
        .await?;
    Ok(Json(row))
}

async fn update_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateTask>,
) -> Result<Json<Value>, ApiError> {
    let as_of = today();
    let updated = state
        .db
        .call(move |conn| {
            let existing: Option<(String, Option<String>, Option<String>, i64)> = conn
                .query_row(
                    "SELECT title, notes, due_date, completed FROM tasks WHERE id = ?",
                    [&id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
                )
                .optional()?;
            let Some((title, notes, due_date, completed)) = existing else {
                return Ok(None);
            };

            let title = match payload.title {
                Some(t) if !t.trim().is_empty() => t.trim().to_string(),
                _ => title,
            };
            let notes = payload.notes.or(notes);
            let due_date = match payload.due.as_deref() {
                Some(s) => resolve::resolve_date(s, as_of).map(|d| d.to_string()),
                None => due_date,
            };
            let completed = match payload.completed {
                Some(v) => v as i64,
                None => completed,
            };

            conn.execute(
                "UPDATE tasks SET title = ?, notes = ?, due_date = ?, completed = ? WHERE id = ?",
                (&title, &notes, &due_date, completed, &id),
            )?;
            Ok(Some(json!({
                "id": id,
                "title": title,
                "notes": notes,
                "dueDate": due_date,
                "completed": completed != 0,
            })))
        })
        .await?;

    updated
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("task not found".to_string()))
}

async fn delete_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state
        .db
        .call(move |conn| Ok(conn.execute("DELETE FROM tasks WHERE id = ?", [&id])?))
        .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("task not found".to_string()));
    }
    Ok(Json(json!({ "ok": true })))
}
