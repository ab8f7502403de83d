use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{Duration, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ai::{self, RetryPolicy, TextGenerator};
use crate::api::error::ApiError;
use crate::api::{build_generator, today, SharedState};
use crate::context;

/// Hard cap on one batch request; generation is a sequential loop and the
/// client waits on a single response.
const MAX_BATCH_DAYS: i64 = 31;

#[derive(Deserialize)]
pub struct ListQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub date: Option<String>,
    pub class_id: Option<String>,
    pub topic: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBatchRequest {
    pub from: String,
    pub to: String,
    pub class_id: Option<String>,
    pub topic: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBellringer {
    pub journal_prompt: Option<String>,
    pub skill_question: Option<String>,
    pub skill_options: Option<Vec<String>>,
    pub skill_answer: Option<String>,
    pub status: Option<String>,
}

/// Shape requested from the model for one day's bellringer.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedBellringer {
    journal_prompt: String,
    #[serde(default)]
    skill_question: Option<String>,
    #[serde(default)]
    skill_options: Vec<String>,
    #[serde(default)]
    skill_answer: Option<String>,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/bellringers", get(list_bellringers))
        .route("/api/bellringers/generate", post(generate_one))
        .route("/api/bellringers/generate-batch", post(generate_batch))
        .route(
            "/api/bellringers/{id}",
            patch(update_bellringer).delete(delete_bellringer),
        )
}

async fn list_bellringers(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let from = query.from.unwrap_or_else(|| "0000-01-01".to_string());
    let to = query.to.unwrap_or_else(|| "9999-12-31".to_string());
    let bellringers = state
        .db
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT b.id, b.date, b.class_id, c.name, b.journal_prompt,
                        b.skill_question, b.skill_options, b.skill_answer, b.status
                 FROM bellringers b LEFT JOIN classes c ON c.id = b.class_id
                 WHERE b.date >= ? AND b.date <= ?
                 ORDER BY b.date",
            )?;
            let rows = stmt
                .query_map([&from, &to], |row| {
                    let options: Option<String> = row.get(6)?;
                    Ok(json!({
                        "id": row.get::<_, String>(0)?,
                        "date": row.get::<_, String>(1)?,
                        "classId": row.get::<_, Option<String>>(2)?,
                        "className": row.get::<_, Option<String>>(3)?,
                        "journalPrompt": row.get::<_, String>(4)?,
                        "skillQuestion": row.get::<_, Option<String>>(5)?,
                        "skillOptions": options
                            .and_then(|o| serde_json::from_str::<Value>(&o).ok())
                            .unwrap_or(Value::Array(vec![])),
                        "skillAnswer": row.get::<_, Option<String>>(7)?,
                        "status": row.get::<_, String>(8)?,
                    }))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;
    Ok(Json(json!({ "bellringers": bellringers })))
}

async fn generate_one(
    State(state): State<SharedState>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<Value>, ApiError> {
    let date = match payload.date.as_deref() {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|_| ApiError::BadRequest("date must be YYYY-MM-DD".to_string()))?,
        None => today(),
    };

    let snapshot = state
        .db
        .call(move |conn| context::build_context(conn, today()))
        .await?;
    let generator = build_generator(&state).await?;

    let generated =
        generate_for_day(generator.as_ref(), &snapshot.to_prompt(), date, payload.topic.as_deref())
            .await?;
    let row = insert_bellringer(&state, date, payload.class_id, generated).await?;
    Ok(Json(row))
}

async fn generate_batch(
    State(state): State<SharedState>,
    Json(payload): Json<GenerateBatchRequest>,
) -> Result<Json<Value>, ApiError> {
    let from = NaiveDate::parse_from_str(&payload.from, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("from must be YYYY-MM-DD".to_string()))?;
    let to = NaiveDate::parse_from_str(&payload.to, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("to must be YYYY-MM-DD".to_string()))?;
    if to < from {
        return Err(ApiError::BadRequest("to must not precede from".to_string()));
    }
    let span = to.signed_duration_since(from).num_days() + 1;
    if span > MAX_BATCH_DAYS {
        return Err(ApiError::BadRequest(format!(
            "batch is limited to {} days",
            MAX_BATCH_DAYS
        )));
    }

    let snapshot = state
        .db
        .call(move |conn| context::build_context(conn, today()))
        .await?;
    let prompt_context = snapshot.to_prompt();
    let generator = build_generator(&state).await?;

    // Sequential by design: one request, one day at a time, no fan-out.
    let mut rows = Vec::new();
    let mut date = from;
    while date <= to {
        let generated =
            generate_for_day(generator.as_ref(), &prompt_context, date, payload.topic.as_deref())
                .await?;
        let row = insert_bellringer(&state, date, payload.class_id.clone(), generated).await?;
        rows.push(row);
        date += Duration::days(1);
    }
    Ok(Json(json!({ "bellringers": rows })))
}

async fn generate_for_day(
    generator: &dyn TextGenerator,
    prompt_context: &str,
    date: NaiveDate,
    topic: Option<&str>,
) -> Result<GeneratedBellringer, ApiError> {
    let system = "You write bellringers: a short journal prompt students answer \
        in the first five minutes of class, plus an optional multiple-choice \
        skill question. Reply with JSON only: {\"journalPrompt\": string, \
        \"skillQuestion\": string?, \"skillOptions\": [string], \"skillAnswer\": string?}.";
    let mut user = format!("{}\nWrite the bellringer for {}.", prompt_context, date);
    if let Some(topic) = topic {
        user.push_str(&format!(" Focus on: {}.", topic));
    }
    let generated = ai::generate_json::<GeneratedBellringer>(
        generator,
        &RetryPolicy::default(),
        system,
        &user,
        1024,
    )
    .await?;
    if generated.journal_prompt.trim().is_empty() {
        return Err(ApiError::Internal(
            "generation returned an empty journal prompt".to_string(),
        ));
    }
    Ok(generated)
}

async fn insert_bellringer(
    state: &SharedState,
    date: NaiveDate,
    class_id: Option<String>,
    generated: GeneratedBellringer,
) -> Result<Value, ApiError> {
    let row = state
        .db
        .call(move |conn| {
            if let Some(class_id) = &class_id {
                require_class(conn, class_id)?;
            }
            let id = Uuid::new_v4().to_string();
            let options_json = if generated.skill_options.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&generated.skill_options)?)
            };
            conn.execute(
                "INSERT INTO bellringers(id, date, class_id, journal_prompt,
                                         skill_question, skill_options, skill_answer)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    date.to_string(),
                    &class_id,
                    &generated.journal_prompt,
                    &generated.skill_question,
                    &options_json,
                    &generated.skill_answer,
                ),
            )?;
            Ok(json!({
                "id": id,
                "date": date.to_string(),
                "classId": class_id,
                "journalPrompt": generated.journal_prompt,
                "skillQuestion": generated.skill_question,
                "skillOptions": generated.skill_options,
                "skillAnswer": generated.skill_answer,
                "status": "draft",
            }))
        })
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("not found") {
                ApiError::NotFound(msg)
            } else {
                ApiError::Internal(msg)
            }
        })?;
    Ok(row)
}

fn require_class(conn: &Connection, class_id: &str) -> anyhow::Result<()> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_none() {
        anyhow::bail!("class not found");
    }
    Ok(())
}

async fn update_bellringer(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateBellringer>,
) -> Result<Json<Value>, ApiError> {
    let updated = state
        .db
        .call(move |conn| {
            type BellRow = (String, Option<String>, Option<String>, Option<String>, String);
            let existing: Option<BellRow> = conn
                .query_row(
                    "SELECT journal_prompt, skill_question, skill_options, skill_answer, status
                     FROM bellringers WHERE id = ?",
                    [&id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
                )
                .optional()?;
            let Some((journal_prompt, skill_question, skill_options, skill_answer, status)) =
                existing
            else {
                return Ok(None);
            };

            let journal_prompt = match payload.journal_prompt {
                Some(p) if !p.trim().is_empty() => p,
                _ => journal_prompt,
            };
            let skill_question = payload.skill_question.or(skill_question);
            let skill_options = match payload.skill_options {
                Some(options) => Some(serde_json::to_string(&options)?),
                None => skill_options,
            };
            let skill_answer = payload.skill_answer.or(skill_answer);
            let status = payload.status.unwrap_or(status);

            conn.execute(
                "UPDATE bellringers
                 SET journal_prompt = ?, skill_question = ?, skill_options = ?,
                     skill_answer = ?, status = ?
                 WHERE id = ?",
                (
                    &journal_prompt,
                    &skill_question,
                    &skill_options,
                    &skill_answer,
                    &status,
                    &id,
                ),
            )?;
            Ok(Some(json!({
                "id": id,
                "journalPrompt": journal_prompt,
                "skillQuestion": skill_question,
                "skillAnswer": skill_answer,
                "status": status,
            })))
        })
        .await?;

    updated
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("bellringer not found".to_string()))
}

async fn delete_bellringer(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state
        .db
        .call(move |conn| Ok(conn.execute("DELETE FROM bellringers WHERE id = ?", [&id])?))
        .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("bellringer not found".to_string()));
    }
    Ok(Json(json!({ "ok": true })))
}
