use axum::extract::{Path, Query, State};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ai::{self, GenOptions, RetryPolicy};
use crate::api::error::ApiError;
use crate::api::{build_generator, new_share_token, today, SharedState};
use crate::context;
use crate::coverage::{self, CoverageStatus};
use crate::render::{self, LessonPlanView};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlan {
    pub title: String,
    pub class_id: Option<String>,
    pub date: Option<String>,
    pub content: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlan {
    pub title: Option<String>,
    pub class_id: Option<String>,
    pub date: Option<String>,
    pub content: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct BrainstormRequest {
    pub message: String,
}

#[derive(Deserialize)]
pub struct CreateComment {
    pub author: Option<String>,
    pub body: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestQuery {
    pub class_id: String,
}

#[derive(Deserialize)]
struct Suggestion {
    code: String,
    idea: String,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/lesson-plans", get(list_plans).post(create_plan))
        .route("/api/lesson-plans/suggest-standards", get(suggest_standards))
        .route(
            "/api/lesson-plans/{id}",
            get(get_plan).patch(update_plan).delete(delete_plan),
        )
        .route("/api/lesson-plans/{id}/brainstorm", post(brainstorm))
        .route("/api/lesson-plans/{id}/publish", post(publish_plan))
        .route(
            "/api/lesson-plans/{id}/comments",
            get(list_comments).post(create_comment),
        )
        .route("/plans/{token}", get(public_plan_page))
}

async fn list_plans(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let plans = state
        .db
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.title, p.class_id, c.name, p.date, p.status,
                        p.share_token IS NOT NULL, p.updated_at
                 FROM lesson_plans p LEFT JOIN classes c ON c.id = p.class_id
                 ORDER BY p.date IS NULL, p.date DESC, p.updated_at DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(json!({
                        "id": row.get::<_, String>(0)?,
                        "title": row.get::<_, String>(1)?,
                        "classId": row.get::<_, Option<String>>(2)?,
                        "className": row.get::<_, Option<String>>(3)?,
                        "date": row.get::<_, Option<String>>(4)?,
                        "status": row.get::<_, String>(5)?,
                        "shared": row.get::<_, i64>(6)? != 0,
                        "updatedAt": row.get::<_, String>(7)?,
                    }))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;
    Ok(Json(json!({ "lessonPlans": plans })))
}

async fn create_plan(
    State(state): State<SharedState>,
    Json(payload): Json<CreatePlan>,
) -> Result<Json<Value>, ApiError> {
    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }

    let row = state
        .db
        .call(move |conn| {
            let id = Uuid::new_v4().to_string();
            let content = payload.content.unwrap_or_default();
            conn.execute(
                "INSERT INTO lesson_plans(id, class_id, date, title, content)
                 VALUES(?, ?, ?, ?, ?)",
                (&id, &payload.class_id, &payload.date, &title, &content),
            )?;
            Ok(json!({
                "id": id,
                "classId": payload.class_id,
                "date": payload.date,
                "title": title,
                "content": content,
                "status": "draft",
            }))
        })
        .await?;
    Ok(Json(row))
}

async fn get_plan(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let plan = state
        .db
        .call(move |conn| {
            let row = conn
                .query_row(
                    "SELECT p.id, p.title, p.class_id, c.name, p.date, p.content,
                            p.status, p.share_token
                     FROM lesson_plans p LEFT JOIN classes c ON c.id = p.class_id
                     WHERE p.id = ?",
                    [&id],
                    |r| {
                        Ok(json!({
                            "id": r.get::<_, String>(0)?,
                            "title": r.get::<_, String>(1)?,
                            "classId": r.get::<_, Option<String>>(2)?,
                            "className": r.get::<_, Option<String>>(3)?,
                            "date": r.get::<_, Option<String>>(4)?,
                            "content": r.get::<_, String>(5)?,
                            "status": r.get::<_, String>(6)?,
                            "shareToken": r.get::<_, Option<String>>(7)?,
                        }))
                    },
                )
                .optional()?;
            Ok(row)
        })
        .await?;
    plan.map(Json)
        .ok_or_else(|| ApiError::NotFound("lesson plan not found".to_string()))
}

async fn update_plan(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePlan>,
) -> Result<Json<Value>, ApiError> {
    let updated = state
        .db
        .call(move |conn| {
            type PlanRow = (String, Option<String>, Option<String>, String, String);
            let existing: Option<PlanRow> = conn
                .query_row(
                    "SELECT title, class_id, date, content, status FROM lesson_plans WHERE id = ?",
                    [&id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
                )
                .optional()?;
            let Some((title, class_id, date, content, status)) = existing else {
                return Ok(None);
            };

            let title = match payload.title {
                Some(t) if !t.trim().is_empty() => t.trim().to_string(),
                _ => title,
            };
            let class_id = payload.class_id.or(class_id);
            let date = payload.date.or(date);
            let content = payload.content.unwrap_or(content);
            let status = payload.status.unwrap_or(status);

            conn.execute(
                "UPDATE lesson_plans
                 SET title = ?, class_id = ?, date = ?, content = ?, status = ?,
                     updated_at = datetime('now')
                 WHERE id = ?",
                (&title, &class_id, &date, &content, &status, &id),
            )?;
            Ok(Some(json!({
                "id": id,
                "title": title,
                "classId": class_id,
                "date": date,
                "content": content,
                "status": status,
            })))
        })
        .await?;

    updated
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("lesson plan not found".to_string()))
}

async fn delete_plan(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state
        .db
        .call(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM lesson_plan_comments WHERE plan_id = ?", [&id])?;
            tx.execute("DELETE FROM brainstorm_messages WHERE plan_id = ?", [&id])?;
            let deleted = tx.execute("DELETE FROM lesson_plans WHERE id = ?", [&id])?;
            tx.commit()?;
            Ok(deleted)
        })
        .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("lesson plan not found".to_string()));
    }
    Ok(Json(json!({ "ok": true })))
}

/// One chat turn of the brainstorming assistant. History is persisted per
/// plan and replayed into the prompt, so the conversation survives page
/// reloads.
async fn brainstorm(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<BrainstormRequest>,
) -> Result<Json<Value>, ApiError> {
    let message = payload.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::BadRequest(
            "message must not be empty".to_string(),
        ));
    }

    let plan_id = id.clone();
    let (plan, history, snapshot) = state
        .db
        .call(move |conn| {
            let plan: Option<(String, String)> = conn
                .query_row(
                    "SELECT title, content FROM lesson_plans WHERE id = ?",
                    [&plan_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            let mut stmt = conn.prepare(
                "SELECT role, content FROM brainstorm_messages
                 WHERE plan_id = ? ORDER BY created_at, id",
            )?;
            let history = stmt
                .query_map([&plan_id], |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            let snapshot = context::build_context(conn, today())?;
            Ok((plan, history, snapshot))
        })
        .await?;

    let Some((title, content)) = plan else {
        return Err(ApiError::NotFound("lesson plan not found".to_string()));
    };

    let system = "You are a lesson-planning brainstorm partner for a teacher. \
        Offer concrete activities, pacing ideas, and materials. Keep replies short \
        and practical.";
    let mut user = format!(
        "{}\nLesson plan \"{}\" so far:\n{}\n\nConversation:\n",
        snapshot.to_prompt(),
        title,
        content
    );
    for (role, text) in &history {
        user.push_str(&format!("{}: {}\n", role, text));
    }
    user.push_str(&format!("teacher: {}\nassistant:", message));

    let generator = build_generator(&state).await?;
    let reply = generator
        .generate(
            system,
            &user,
            &GenOptions {
                temperature: 0.7,
                max_tokens: 1024,
            },
        )
        .await?;

    let stored_reply = reply.trim().to_string();
    let row = state
        .db
        .call(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO brainstorm_messages(id, plan_id, role, content) VALUES(?, ?, ?, ?)",
                (Uuid::new_v4().to_string(), &id, "teacher", &message),
            )?;
            tx.execute(
                "INSERT INTO brainstorm_messages(id, plan_id, role, content) VALUES(?, ?, ?, ?)",
                (Uuid::new_v4().to_string(), &id, "assistant", &stored_reply),
            )?;
            tx.commit()?;
            Ok(json!({ "reply": stored_reply }))
        })
        .await?;
    Ok(Json(row))
}

async fn publish_plan(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let token = new_share_token();
    let published = state
        .db
        .call(move |conn| {
            let existing: Option<Option<String>> = conn
                .query_row(
                    "SELECT share_token FROM lesson_plans WHERE id = ?",
                    [&id],
                    |r| r.get(0),
                )
                .optional()?;
            let Some(existing_token) = existing else {
                return Ok(None);
            };
            // Re-publishing keeps the existing link stable.
            let token = existing_token.unwrap_or(token);
            conn.execute(
                "UPDATE lesson_plans
                 SET status = 'published', share_token = ?, updated_at = datetime('now')
                 WHERE id = ?",
                (&token, &id),
            )?;
            Ok(Some(token))
        })
        .await?;

    let token =
        published.ok_or_else(|| ApiError::NotFound("lesson plan not found".to_string()))?;
    Ok(Json(json!({
        "shareToken": token,
        "url": format!("/plans/{}", token),
    })))
}

async fn list_comments(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let comments = state
        .db
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, author, body, created_at FROM lesson_plan_comments
                 WHERE plan_id = ? ORDER BY created_at, id",
            )?;
            let rows = stmt
                .query_map([&id], |row| {
                    Ok(json!({
                        "id": row.get::<_, String>(0)?,
                        "author": row.get::<_, String>(1)?,
                        "body": row.get::<_, String>(2)?,
                        "createdAt": row.get::<_, String>(3)?,
                    }))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;
    Ok(Json(json!({ "comments": comments })))
}

async fn create_comment(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<CreateComment>,
) -> Result<Json<Value>, ApiError> {
    let body = payload.body.trim().to_string();
    if body.is_empty() {
        return Err(ApiError::BadRequest("body must not be empty".to_string()));
    }

    let row = state
        .db
        .call(move |conn| {
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM lesson_plans WHERE id = ?", [&id], |r| {
                    r.get(0)
                })
                .optional()?;
            if exists.is_none() {
                anyhow::bail!("lesson plan not found");
            }
            let comment_id = Uuid::new_v4().to_string();
            let author = payload.author.unwrap_or_else(|| "anonymous".to_string());
            conn.execute(
                "INSERT INTO lesson_plan_comments(id, plan_id, author, body) VALUES(?, ?, ?, ?)",
                (&comment_id, &id, &author, &body),
            )?;
            Ok(json!({ "id": comment_id, "author": author, "body": body }))
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
    Ok(Json(row))
}

/// Gap-driven lesson ideas: feed the class's uncovered and stale standards
/// to the model and ask for one activity idea per standard.
async fn suggest_standards(
    State(state): State<SharedState>,
    Query(query): Query<SuggestQuery>,
) -> Result<Json<Value>, ApiError> {
    let class_id = query.class_id.clone();
    let gaps = state
        .db
        .call(move |conn| {
            let classes = context::load_classes(conn)?;
            let Some(class) = classes.iter().find(|c| c.id == class_id) else {
                anyhow::bail!("class not found");
            };
            let standards = context::load_standards(conn, None)?;
            let tags = context::load_tag_rows(conn)?;
            let per_class = coverage::compute_coverage(
                &tags,
                &standards,
                std::slice::from_ref(class),
                today(),
            );
            let gaps: Vec<(String, String, CoverageStatus)> = per_class
                .into_iter()
                .flat_map(|c| c.standards)
                .filter(|s| s.is_gap())
                .map(|s| {
                    let description = standards
                        .iter()
                        .find(|st| st.id == s.standard_id)
                        .map(|st| st.description.clone())
                        .unwrap_or_default();
                    (s.code, description, s.status)
                })
                .collect();
            Ok(gaps)
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

    if gaps.is_empty() {
        return Ok(Json(json!({ "suggestions": [] })));
    }

    let mut gap_text = String::new();
    for (code, description, status) in gaps.iter().take(12) {
        let label = match status {
            CoverageStatus::Stale => "stale",
            _ => "never covered",
        };
        gap_text.push_str(&format!("- {} ({}): {}\n", code, label, description));
    }
    let system = "You suggest lesson activities that close standards-coverage gaps. \
        Reply with JSON only: an array of {\"code\": string, \"idea\": string}, one \
        entry per standard, ideas of one or two sentences.";
    let user = format!("Standards needing coverage:\n{}", gap_text);

    let generator = build_generator(&state).await?;
    let suggestions: Vec<Suggestion> =
        ai::generate_json(generator.as_ref(), &RetryPolicy::default(), system, &user, 2048).await?;

    let out: Vec<Value> = suggestions
        .into_iter()
        .map(|s| json!({ "code": s.code, "idea": s.idea }))
        .collect();
    Ok(Json(json!({ "suggestions": out })))
}

/// Public, token-gated printable page. No auth beyond the unguessable
/// token; unknown tokens 404.
async fn public_plan_page(
    State(state): State<SharedState>,
    Path(token): Path<String>,
) -> Result<Html<String>, ApiError> {
    let view = state
        .db
        .call(move |conn| {
            let row: Option<LessonPlanView> = conn
                .query_row(
                    "SELECT p.title, c.name, p.date, p.content
                     FROM lesson_plans p LEFT JOIN classes c ON c.id = p.class_id
                     WHERE p.share_token = ? AND p.status = 'published'",
                    [&token],
                    |r| {
                        Ok(LessonPlanView {
                            title: r.get(0)?,
                            class_name: r.get(1)?,
                            date: r.get(2)?,
                            content: r.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
        .await?;

    let view = view.ok_or_else(|| ApiError::NotFound("no such plan".to_string()))?;
    Ok(Html(render::lesson_plan_page(&view)))
}
