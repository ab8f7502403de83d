pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use crate::ai::{self, TextGenerator};
use crate::config::Config;
use crate::db::{self, DbHandle};
use error::ApiError;

pub struct AppState {
    pub db: DbHandle,
    pub config: Config,
}

pub type SharedState = Arc<AppState>;

/// Assemble the full application router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .merge(handlers::tasks::router())
        .merge(handlers::classes::router())
        .merge(handlers::calendar::router())
        .merge(handlers::activities::router())
        .merge(handlers::bellringers::router())
        .merge(handlers::lesson_plans::router())
        .merge(handlers::standards::router())
        .merge(handlers::subdash::router())
        .merge(handlers::media::router())
        .merge(handlers::settings::router())
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// Resolve the AI provider and key (env first, settings table second) and
/// construct a generator for this request. Built per request so a key
/// saved through `/api/settings` takes effect without a restart.
pub async fn build_generator(state: &AppState) -> Result<Box<dyn TextGenerator>, ApiError> {
    let cfg = state.config.clone();
    let (provider, key) = state
        .db
        .call(move |conn| {
            let provider = match cfg.ai_provider {
                Some(p) => p,
                None => db::settings_get(conn, "ai.provider")?
                    .unwrap_or_else(|| "anthropic".to_string()),
            };
            let key = match provider.as_str() {
                "openai" => match cfg.openai_api_key {
                    Some(k) => Some(k),
                    None => db::settings_get(conn, "ai.openaiApiKey")?,
                },
                _ => match cfg.anthropic_api_key {
                    Some(k) => Some(k),
                    None => db::settings_get(conn, "ai.anthropicApiKey")?,
                },
            };
            Ok((provider, key))
        })
        .await?;

    let key = key.ok_or_else(|| ai::GenError::MissingApiKey(provider.clone()))?;
    Ok(ai::build(&provider, key))
}

/// Today in the server's local timezone. Handlers take this as the "as of"
/// date for resolvers and coverage.
pub fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

/// Unguessable token for public share links.
pub fn new_share_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
