use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use crate::api::error::ApiError;
use crate::api::SharedState;
use crate::db;

pub fn router() -> Router<SharedState> {
    Router::new().route("/api/settings", get(get_settings).put(put_settings))
}

async fn get_settings(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let pairs = state
        .db
        .call(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
            let rows = stmt
                .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;

    let mut map = Map::new();
    for (key, value) in pairs {
        // API keys stay writable through this endpoint but never readable.
        if key.ends_with("ApiKey") {
            map.insert(key, Value::Bool(true));
        } else {
            map.insert(key, Value::String(value));
        }
    }
    Ok(Json(json!({ "settings": map })))
}

async fn put_settings(
    State(state): State<SharedState>,
    Json(payload): Json<Map<String, Value>>,
) -> Result<Json<Value>, ApiError> {
    let updated = state
        .db
        .call(move |conn| {
            let mut count = 0usize;
            for (key, value) in payload {
                let Some(value) = value.as_str() else {
                    anyhow::bail!("setting values must be strings");
                };
                db::settings_set(conn, &key, value)?;
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
