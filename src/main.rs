use std::sync::Arc;

use codeboard::config::Config;
use codeboard::db::{self, Backend, MemoryBackend, PgBackend};
use codeboard::error::AppError;
use codeboard::services::auth::MemoryIdentity;
use codeboard::state::AppState;
use codeboard::storage::FileStorage;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();

    let backend: Arc<dyn Backend> = match &config.database_url {
        Some(url) => {
            let pool = db::init_pool(url, config.db_max_connections).await?;
            tracing::info!(max_connections = config.db_max_connections, "connected to postgres");
            Arc::new(PgBackend::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory backend");
            Arc::new(MemoryBackend::new())
        }
    };
    let storage = Arc::new(FileStorage::new(config.local_storage_dir.clone()));
    let state = AppState::new(&config, backend, Arc::new(MemoryIdentity::new()), storage);

    state.auth.initialize().await;
    match state.local.scene() {
        Some(scene) => tracing::info!(
            scene_id = %scene.id,
            name = %scene.name,
            widgets = scene.widgets.len(),
            has_canvas = scene.canvas_data.is_some(),
            "local scene"
        ),
        None => tracing::info!(dir = %config.local_storage_dir.display(), "no local scene yet"),
    }
    if let Some(user) = state.auth.user() {
        state.workspaces.fetch_workspaces(user.id).await;
        for ws in state.workspaces.workspaces() {
            tracing::info!(workspace_id = %ws.id, name = %ws.name, "workspace");
        }
    }
    Ok(())
}
