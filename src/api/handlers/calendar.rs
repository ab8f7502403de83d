use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::NaiveDate;
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::SharedState;

#[derive(Deserialize)]
pub struct ListQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEvent {
    pub title: String,
    pub date: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub class_id: Option<String>,
    pub kind: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEvent {
    pub title: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub kind: Option<String>,
    pub notes: Option<String>,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/calendar", get(list_events).post(create_event))
        .route("/api/calendar/{id}", patch(update_event).delete(delete_event))
}

fn require_iso_date(s: &str, field: &str) -> Result<String, ApiError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.to_string())
        .map_err(|_| ApiError::BadRequest(format!("{} must be YYYY-MM-DD", field)))
}

async fn list_events(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let from = query.from.unwrap_or_else(|| "0000-01-01".to_string());
    let to = query.to.unwrap_or_else(|| "9999-12-31".to_string());
    let events = state
        .db
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT e.id, e.title, e.date, e.start_time, e.end_time,
                        e.class_id, c.name, e.kind, e.notes
                 FROM calendar_events e LEFT JOIN classes c ON c.id = e.class_id
                 WHERE e.date >= ? AND e.date <= ?
                 ORDER BY e.date, e.start_time IS NULL, e.start_time",
            )?;
            let rows = stmt
                .query_map([&from, &to], |row| {
                    Ok(json!({
                        "id": row.get::<_, String>(0)?,
                        "title": row.get::<_, String>(1)?,
                        "date": row.get::<_, String>(2)?,
                        "startTime": row.get::<_, Option<String>>(3)?,
                        "endTime": row.get::<_, Option<String>>(4)?,
                        "classId": row.get::<_, Option<String>>(5)?,
                        "className": row.get::<_, Option<String>>(6)?,
                        "kind": row.get::<_, String>(7)?,
                        "notes": row.get::<_, Option<String>>(8)?,
                    }))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;
    Ok(Json(json!({ "events": events })))
}

async fn create_event(
    State(state): State<SharedState>,
    Json(payload): Json<CreateEvent>,
) -> Result<Json<Value>, ApiError> {
    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    let date = require_iso_date(&payload.date, "date")?;

    let row = state
        .db
        .call(move |conn| {
            let id = Uuid::new_v4().to_string();
            let kind = payload.kind.unwrap_or_else(|| "event".to_string());
            conn.execute(
                "INSERT INTO calendar_events(id, title, date, start_time, end_time, class_id, kind, notes)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &title,
                    &date,
                    &payload.start_time,
                    &payload.end_time,
                    &payload.class_id,
                    &kind,
                    &payload.notes,
                ),
            )?;
            Ok(json!({
                "id": id,
                "title": title,
                "date": date,
                "startTime": payload.start_time,
                "endTime": payload.end_time,
                "classId": payload.class_id,
                "kind": kind,
                "notes": payload.notes,
            }))
        })
        .await?;
    Ok(Json(row))
}

async fn update_event(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateEvent>,
) -> Result<Json<Value>, ApiError> {
    let date = match payload.date.as_deref() {
        Some(d) => Some(require_iso_date(d, "date")?),
        None => None,
    };

    let updated = state
        .db
        .call(move |conn| {
            type EventRow = (
                String,
                String,
                Option<String>,
                Option<String>,
                String,
                Option<String>,
            );
            let existing: Option<EventRow> = conn
                .query_row(
                    "SELECT title, date, start_time, end_time, kind, notes
                     FROM calendar_events WHERE id = ?",
                    [&id],
                    |r| {
                        Ok((
                            r.get(0)?,
                            r.get(1)?,
                            r.get(2)?,
                            r.get(3)?,
                            r.get(4)?,
                            r.get(5)?,
                        ))
                    },
                )
                .optional()?;
            let Some((title, old_date, start_time, end_time, kind, notes)) = existing else {
                return Ok(None);
            };

            let title = match payload.title {
                Some(t) if !t.trim().is_empty() => t.trim().to_string(),
                _ => title,
            };
            let date = date.unwrap_or(old_date);
            let start_time = payload.start_time.or(start_time);
            let end_time = payload.end_time.or(end_time);
            let kind = payload.kind.unwrap_or(kind);
            let notes = payload.notes.or(notes);

            conn.execute(
                "UPDATE calendar_events
                 SET title = ?, date = ?, start_time = ?, end_time = ?, kind = ?, notes = ?
                 WHERE id = ?",
                (&title, &date, &start_time, &end_time, &kind, &notes, &id),
            )?;
            Ok(Some(json!({
                "id": id,
                "title": title,
                "date": date,
                "startTime": start_time,
                "endTime": end_time,
                "kind": kind,
                "notes": notes,
            })))
        })
        .await?;

    updated
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("event not found".to_string()))
}

async fn delete_event(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state
        .db
        .call(move |conn| Ok(conn.execute("DELETE FROM calendar_events WHERE id = ?", [&id])?))
        .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("event not found".to_string()));
    }
    Ok(Json(json!({ "ok": true })))
}
