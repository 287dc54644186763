//! Remote persistence: pool setup, the `Backend` seam, and its implementations.
//!
//! SYSTEM CONTEXT
//! ==============
//! Stores never issue SQL themselves. They call a `Backend`, which is either
//! Postgres (`PgBackend`) or the in-process `MemoryBackend` used by tests and
//! offline runs. Row shapes and column names stay inside `rows`.

pub mod memory;
pub mod postgres;
pub mod rows;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::error::AppError;
use crate::model::{CanvasDocument, Profile, ProfileUpdate, Scene, SharePermission, Widget, Workspace};

pub use memory::{BackendOp, MemoryBackend};
pub use postgres::PgBackend;

/// Initialize the `PostgreSQL` connection pool and run migrations.
///
/// # Errors
///
/// Returns an error if the connection or migrations fail.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("src/db/migrations").run(&pool).await?;

    Ok(pool)
}

// =============================================================================
// WRITE PAYLOADS
// =============================================================================

/// Row to insert into `scenes`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewScene {
    pub workspace_id: Uuid,
    pub name: String,
    pub canvas_data: Option<CanvasDocument>,
    pub widgets: Vec<Widget>,
}

/// Share columns written together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareState {
    pub token: Option<String>,
    pub permission: SharePermission,
}

/// Columns to change on a scene. Every write also bumps `updated_at`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenePatch {
    pub name: Option<String>,
    pub canvas_data: Option<CanvasDocument>,
    pub widgets: Option<Vec<Widget>>,
    pub share: Option<ShareState>,
}

impl ScenePatch {
    #[must_use]
    pub fn widgets(widgets: Vec<Widget>) -> Self {
        Self { widgets: Some(widgets), ..Self::default() }
    }

    #[must_use]
    pub fn canvas(canvas: CanvasDocument) -> Self {
        Self { canvas_data: Some(canvas), ..Self::default() }
    }

    #[must_use]
    pub fn share(token: Option<String>, permission: SharePermission) -> Self {
        Self { share: Some(ShareState { token, permission }), ..Self::default() }
    }
}

// =============================================================================
// BACKEND TRAIT
// =============================================================================

/// The remote relational data service. Enables mocking in tests.
///
/// Every method reports failures as `AppError`; a missing row is
/// `AppError::NotFound`, anything else is `AppError::Network`.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Scenes of a workspace, most recently updated first.
    async fn list_scenes(&self, workspace_id: Uuid) -> Result<Vec<Scene>, AppError>;

    async fn get_scene(&self, id: Uuid) -> Result<Scene, AppError>;

    async fn insert_scene(&self, scene: NewScene) -> Result<Scene, AppError>;

    async fn update_scene(&self, id: Uuid, patch: &ScenePatch) -> Result<(), AppError>;

    async fn delete_scene(&self, id: Uuid) -> Result<(), AppError>;

    /// Workspaces of an owner, newest first.
    async fn list_workspaces(&self, owner_id: Uuid) -> Result<Vec<Workspace>, AppError>;

    /// Insert a workspace. The owner's stored tier decides the quota: unless
    /// the profile is premium, the insert is refused with
    /// `AppError::QuotaExceeded` once the owner has `free_limit` workspaces.
    async fn insert_workspace(&self, owner_id: Uuid, name: &str, free_limit: usize) -> Result<Workspace, AppError>;

    async fn update_workspace(&self, id: Uuid, name: &str) -> Result<(), AppError>;

    async fn delete_workspace(&self, id: Uuid) -> Result<(), AppError>;

    /// `Ok(None)` when the user has no profile row yet.
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError>;

    /// Create a free-tier profile if none exists and return the stored row.
    async fn create_profile(&self, user_id: Uuid) -> Result<Profile, AppError>;

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<(), AppError>;
}
