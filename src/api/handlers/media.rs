use axum::extract::{Multipart, Path, State};
use axum::routing::get;
use axum::{Json, Router};
use rusqlite::OptionalExtension;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/media", get(list_media).post(upload_media))
        .route("/api/media/{id}", axum::routing::delete(delete_media))
}

async fn list_media(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let items = state
        .db
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, file_name, content_type, size_bytes, uploaded_at
                 FROM media_items ORDER BY uploaded_at DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(json!({
                        "id": row.get::<_, String>(0)?,
                        "fileName": row.get::<_, String>(1)?,
                        "contentType": row.get::<_, String>(2)?,
                        "sizeBytes": row.get::<_, i64>(3)?,
                        "uploadedAt": row.get::<_, String>(4)?,
                    }))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;
    Ok(Json(json!({ "media": items })))
}

/// Uploads are buffered fully in memory before the file write; there is no
/// streaming path and classroom media is small.
async fn upload_media(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("bad multipart body: {}", e)))?
        .ok_or_else(|| ApiError::BadRequest("missing file field".to_string()))?;

    let file_name = field
        .file_name()
        .map(sanitize_file_name)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::BadRequest("file must have a name".to_string()))?;
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("file is empty".to_string()));
    }

    let id = Uuid::new_v4().to_string();
    let media_dir = state.config.data_dir.join("media");
    tokio::fs::create_dir_all(&media_dir)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let path = media_dir.join(format!("{}-{}", id, file_name));
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let size = bytes.len() as i64;
    let stored_path = path.to_string_lossy().to_string();
    let row = state
        .db
        .call(move |conn| {
            conn.execute(
                "INSERT INTO media_items(id, file_name, content_type, size_bytes, path)
                 VALUES(?, ?, ?, ?, ?)",
                (&id, &file_name, &content_type, size, &stored_path),
            )?;
            Ok(json!({
                "id": id,
                "fileName": file_name,
                "contentType": content_type,
                "sizeBytes": size,
            }))
        })
        .await?;
    Ok(Json(row))
}

async fn delete_media(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let path = state
        .db
        .call(move |conn| {
            let path: Option<String> = conn
                .query_row("SELECT path FROM media_items WHERE id = ?", [&id], |r| {
                    r.get(0)
                })
                .optional()?;
            if path.is_some() {
                conn.execute("DELETE FROM media_items WHERE id = ?", [&id])?;
            }
            Ok(path)
        })
        .await?;

    let Some(path) = path else {
        return Err(ApiError::NotFound("media item not found".to_string()));
    };
    // The row is the source of truth; a missing file on disk is not an error.
    let _ = tokio::fs::remove_file(&path).await;
    Ok(Json(json!({ "ok": true })))
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
