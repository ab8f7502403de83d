use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ai::{self, RetryPolicy};
use crate::api::error::ApiError;
use crate::api::{build_generator, today, SharedState};
use crate::context;
use crate::coverage;

#[derive(Deserialize)]
pub struct ListQuery {
    pub subject: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStandard {
    pub grade_band: String,
    pub code: String,
    pub description: String,
    pub strand: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub subject: String,
    pub standards: Vec<ImportStandard>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseRequest {
    pub text: String,
    pub subject: String,
    pub grade_band: Option<String>,
}

/// Row shape asked of the model when parsing pasted standards text.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedStandard {
    code: String,
    description: String,
    #[serde(default)]
    strand: Option<String>,
    #[serde(default)]
    grade_band: Option<String>,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/standards", get(list_standards))
        .route("/api/standards/import", post(import_standards))
        .route("/api/standards/parse", post(parse_standards))
        .route("/api/standards/coverage", get(coverage_report))
}

async fn list_standards(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let standards = state
        .db
        .call(move |conn| {
            let base = "SELECT id, subject, grade_band, code, description, strand FROM standards";
            let order = " ORDER BY subject, grade_band, code";
            let map = |row: &rusqlite::Row<'_>| {
                Ok(json!({
                    "id": row.get::<_, String>(0)?,
                    "subject": row.get::<_, String>(1)?,
                    "gradeBand": row.get::<_, String>(2)?,
                    "code": row.get::<_, String>(3)?,
                    "description": row.get::<_, String>(4)?,
                    "strand": row.get::<_, Option<String>>(5)?,
                }))
            };
            let rows = match query.subject {
                Some(subject) => {
                    let sql = format!("{} WHERE subject = ?{}", base, order);
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map([&subject], map)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let sql = format!("{}{}", base, order);
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map([], map)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
        .await?;
    Ok(Json(json!({ "standards": standards })))
}

/// Bulk content refresh for one subject: the catalog is otherwise
/// immutable, so the existing rows for the subject (and any tags pointing
/// at them) are replaced in a single transaction.
async fn import_standards(
    State(state): State<SharedState>,
    Json(payload): Json<ImportRequest>,
) -> Result<Json<Value>, ApiError> {
    let subject = payload.subject.trim().to_string();
    if subject.is_empty() {
        return Err(ApiError::BadRequest(
            "subject must not be empty".to_string(),
        ));
    }
    if payload.standards.is_empty() {
        return Err(ApiError::BadRequest(
            "standards must not be empty".to_string(),
        ));
    }

    let imported = state
        .db
        .call(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM activity_standard_tags
                 WHERE standard_id IN (SELECT id FROM standards WHERE subject = ?)",
                [&subject],
            )?;
            tx.execute("DELETE FROM standards WHERE subject = ?", [&subject])?;
            let mut count = 0usize;
            for row in &payload.standards {
                if row.code.trim().is_empty() || row.description.trim().is_empty() {
                    continue;
                }
                tx.execute(
                    "INSERT INTO standards(id, subject, grade_band, code, description, strand)
                     VALUES(?, ?, ?, ?, ?, ?)",
                    (
                        Uuid::new_v4().to_string(),
                        &subject,
                        row.grade_band.trim(),
                        row.code.trim(),
                        row.description.trim(),
                        &row.strand,
                    ),
                )?;
                count += 1;
            }
            tx.commit()?;
            Ok(count)
        })
        .await?;
    Ok(Json(json!({ "imported": imported })))
}

/// Turn pasted curriculum text into catalog rows. Nothing is written; the
/// client reviews the parse and then calls import.
async fn parse_standards(
    State(state): State<SharedState>,
    Json(payload): Json<ParseRequest>,
) -> Result<Json<Value>, ApiError> {
    let text = payload.text.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }

    let system = "You convert pasted curriculum standards documents into structured \
        rows. Reply with JSON only: an array of {\"code\": string, \"description\": \
        string, \"strand\": string?, \"gradeBand\": string?}. Preserve the source's \
        own codes; do not invent standards that are not in the text.";

    let generator = build_generator(&state).await?;
    let parsed: Vec<ParsedStandard> =
        ai::generate_json(generator.as_ref(), &RetryPolicy::default(), system, &text, 4096).await?;

    let default_band = payload.grade_band.unwrap_or_else(|| "6-8".to_string());
    let rows: Vec<Value> = parsed
        .into_iter()
        .filter(|p| !p.code.trim().is_empty() && !p.description.trim().is_empty())
        .map(|p| {
            json!({
                "subject": payload.subject,
                "gradeBand": p.grade_band.unwrap_or_else(|| default_band.clone()),
                "code": p.code,
                "description": p.description,
                "strand": p.strand,
            })
        })
        .collect();
    Ok(Json(json!({ "standards": rows })))
}

async fn coverage_report(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let as_of = today();
    let report = state
        .db
        .call(move |conn| {
            // load_classes orders by id and load_standards by
            // subject/grade_band/code, which fixes the output ordering.
            let classes = context::load_classes(conn)?;
            let standards = context::load_standards(conn, None)?;
            let tags = context::load_tag_rows(conn)?;
            Ok(coverage::compute_coverage(&tags, &standards, &classes, as_of))
        })
        .await?;
    Ok(Json(json!({ "asOf": as_of.to_string(), "coverage": report })))
}
