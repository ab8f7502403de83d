use axum::extract::{Path, State};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::ai::GenOptions;
use crate::api::error::ApiError;
use crate::api::{build_generator, new_share_token, today, SharedState};
use crate::context;
use crate::db;
use crate::render::{self, SubDashView};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub date: Option<String>,
    /// Extra instructions for the day ("assembly at 10", "no labs").
    pub instructions: Option<String>,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/subdash", get(list_sub_plans))
        .route("/api/subdash/generate", post(generate_sub_plan))
        .route("/api/subdash/{id}/publish", post(publish_sub_plan))
        .route("/api/subdash/{id}", get(get_sub_plan).delete(delete_sub_plan))
        .route("/api/profile", get(get_profile).put(put_profile))
        .route("/subdash/{token}", get(public_subdash_page))
}

async fn list_sub_plans(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let plans = state
        .db
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, date, share_token IS NOT NULL, created_at
                 FROM sub_plans ORDER BY date DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(json!({
                        "id": row.get::<_, String>(0)?,
                        "date": row.get::<_, String>(1)?,
                        "shared": row.get::<_, i64>(2)? != 0,
                        "createdAt": row.get::<_, String>(3)?,
                    }))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;
    Ok(Json(json!({ "subPlans": plans })))
}

async fn get_sub_plan(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let plan = state
        .db
        .call(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, date, content, share_token FROM sub_plans WHERE id = ?",
                    [&id],
                    |r| {
                        Ok(json!({
                            "id": r.get::<_, String>(0)?,
                            "date": r.get::<_, String>(1)?,
                            "content": r.get::<_, String>(2)?,
                            "shareToken": r.get::<_, Option<String>>(3)?,
                        }))
                    },
                )
                .optional()?;
            Ok(row)
        })
        .await?;
    plan.map(Json)
        .ok_or_else(|| ApiError::NotFound("sub plan not found".to_string()))
}

/// Synthesize the substitute packet from the teaching context plus the
/// classroom profile, then persist it for review and publishing.
async fn generate_sub_plan(
    State(state): State<SharedState>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<Value>, ApiError> {
    let date = match payload.date.as_deref() {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|_| ApiError::BadRequest("date must be YYYY-MM-DD".to_string()))?,
        None => today(),
    };

    let (snapshot, profile) = state
        .db
        .call(move |conn| {
            let snapshot = context::build_context(conn, today())?;
            let profile = db::profile_all(conn)?;
            Ok((snapshot, profile))
        })
        .await?;

    let system = "You write substitute-teacher packets. Produce plain text with \
        clear sections: the day's schedule, what each class should do, classroom \
        procedures, and who to ask for help. Only use information you were given; \
        leave placeholders like [FILL IN] where something is unknown.";
    let mut user = format!(
        "{}\nClassroom profile:\n",
        snapshot.to_prompt()
    );
    for (key, value) in &profile {
        user.push_str(&format!("- {}: {}\n", key, value));
    }
    user.push_str(&format!("\nWrite the packet for {}.", date));
    if let Some(instructions) = payload.instructions.as_deref() {
        user.push_str(&format!(" Notes for the day: {}.", instructions));
    }

    let generator = build_generator(&state).await?;
    let content = generator
        .generate(
            system,
            &user,
            &GenOptions {
                temperature: 0.3,
                max_tokens: 2048,
            },
        )
        .await?;
    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::Internal(
            "generation returned an empty packet".to_string(),
        ));
    }

    let row = state
        .db
        .call(move |conn| {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO sub_plans(id, date, content) VALUES(?, ?, ?)",
                (&id, date.to_string(), &content),
            )?;
            Ok(json!({ "id": id, "date": date.to_string(), "content": content }))
        })
        .await?;
    Ok(Json(row))
}

async fn publish_sub_plan(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let token = new_share_token();
    let published = state
        .db
        .call(move |conn| {
            let existing: Option<Option<String>> = conn
                .query_row(
                    "SELECT share_token FROM sub_plans WHERE id = ?",
                    [&id],
                    |r| r.get(0),
                )
                .optional()?;
            let Some(existing_token) = existing else {
                return Ok(None);
            };
            let token = existing_token.unwrap_or(token);
            conn.execute(
                "UPDATE sub_plans SET share_token = ? WHERE id = ?",
                (&token, &id),
            )?;
            Ok(Some(token))
        })
        .await?;

    let token = published.ok_or_else(|| ApiError::NotFound("sub plan not found".to_string()))?;
    Ok(Json(json!({
        "shareToken": token,
        "url": format!("/subdash/{}", token),
    })))
}

async fn delete_sub_plan(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state
        .db
        .call(move |conn| Ok(conn.execute("DELETE FROM sub_plans WHERE id = ?", [&id])?))
        .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("sub plan not found".to_string()));
    }
    Ok(Json(json!({ "ok": true })))
}

async fn get_profile(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let pairs = state.db.call(|conn| db::profile_all(conn)).await?;
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert(key, Value::String(value));
    }
    Ok(Json(json!({ "profile": map })))
}

/// Upsert the posted key/value pairs; keys not present are left alone.
async fn put_profile(
    State(state): State<SharedState>,
    Json(payload): Json<Map<String, Value>>,
) -> Result<Json<Value>, ApiError> {
    let updated = state
        .db
        .call(move |conn| {
            let mut count = 0usize;
            for (key, value) in payload {
                let Some(value) = value.as_str() else {
                    anyhow::bail!("profile values must be strings");
                };
                db::profile_set(conn, &key, value)?;
                count += 1;
            }
            Ok(count)
        })
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("must be strings") {
                ApiError::BadRequest(msg)
            } else {
                ApiError::Internal(msg)
            }
        })?;
    Ok(Json(json!({ "updated": updated })))
}

async fn public_subdash_page(
    State(state): State<SharedState>,
    Path(token): Path<String>,
) -> Result<Html<String>, ApiError> {
    let view = state
        .db
        .call(move |conn| {
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT date, content FROM sub_plans WHERE share_token = ?",
                    [&token],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            let Some((date, content)) = row else {
                return Ok(None);
            };
            let profile = db::profile_all(conn)?;
            Ok(Some(SubDashView {
                date,
                content,
                profile,
            }))
        })
        .await?;

    let view = view.ok_or_else(|| ApiError::NotFound("no such sub plan".to_string()))?;
    Ok(Html(render::subdash_page(&view)))
}
