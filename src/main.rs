use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use homeroomd::{api, config::Config, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("homeroomd=info")),
        )
        .init();

    let config = Config::from_env();
    let conn = db::open_db(&config.data_dir).context("failed to open database")?;

    let addr = format!("127.0.0.1:{}", config.port);
    let state = Arc::new(api::AppState {
        db: db::DbHandle::new(conn),
        config,
    });
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("homeroomd listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
