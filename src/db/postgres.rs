//! `Backend` over a Postgres pool.
//!
//! ERROR HANDLING
//! ==============
//! Driver errors become `AppError::Network`. Updates and deletes that touch
//! no row become `AppError::NotFound` so callers can distinguish a stale id
//! from an outage.

use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::rows::{PROFILE_COLUMNS, ProfileRow, SCENE_COLUMNS, SceneRow, WORKSPACE_COLUMNS, WorkspaceRow, encode_widgets};
use super::{Backend, NewScene, ScenePatch};
use crate::error::AppError;
use crate::model::{Profile, ProfileUpdate, Scene, Tier, Workspace};

#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn push_scene_patch(builder: &mut QueryBuilder<'_, Postgres>, patch: &ScenePatch) {
    builder.push("UPDATE scenes SET updated_at = now()");
    if let Some(name) = &patch.name {
        builder.push(", name = ").push_bind(name.clone());
    }
    if let Some(canvas) = &patch.canvas_data {
        builder.push(", canvas_data = ").push_bind(canvas.0.clone());
    }
    if let Some(widgets) = &patch.widgets {
        builder.push(", widgets = ").push_bind(encode_widgets(widgets));
    }
    if let Some(share) = &patch.share {
        builder.push(", share_token = ").push_bind(share.token.clone());
        builder
            .push(", share_permission = ")
            .push_bind(share.permission.as_str());
    }
}

#[async_trait::async_trait]
impl Backend for PgBackend {
    async fn list_scenes(&self, workspace_id: Uuid) -> Result<Vec<Scene>, AppError> {
        let sql = format!("SELECT {SCENE_COLUMNS} FROM scenes WHERE workspace_id = $1 ORDER BY updated_at DESC");
        let rows = sqlx::query_as::<_, SceneRow>(&sql)
            .bind(workspace_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Scene::from).collect())
    }

    async fn get_scene(&self, id: Uuid) -> Result<Scene, AppError> {
        let sql = format!("SELECT {SCENE_COLUMNS} FROM scenes WHERE id = $1");
        let row = sqlx::query_as::<_, SceneRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Scene::from)
            .ok_or_else(|| AppError::not_found("scene", id))
    }

    async fn insert_scene(&self, scene: NewScene) -> Result<Scene, AppError> {
        let sql = format!(
            "INSERT INTO scenes (workspace_id, name, canvas_data, widgets)
             VALUES ($1, $2, $3, $4)
             RETURNING {SCENE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SceneRow>(&sql)
            .bind(scene.workspace_id)
            .bind(&scene.name)
            .bind(scene.canvas_data.map(|c| c.0))
            .bind(encode_widgets(&scene.widgets))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn update_scene(&self, id: Uuid, patch: &ScenePatch) -> Result<(), AppError> {
        let mut builder = QueryBuilder::new("");
        push_scene_patch(&mut builder, patch);
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("scene", id));
        }
        Ok(())
    }

    async fn delete_scene(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM scenes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("scene", id));
        }
        Ok(())
    }

    async fn list_workspaces(&self, owner_id: Uuid) -> Result<Vec<Workspace>, AppError> {
        let sql = format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE owner_id = $1 ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, WorkspaceRow>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Workspace::from).collect())
    }

    async fn insert_workspace(&self, owner_id: Uuid, name: &str, free_limit: usize) -> Result<Workspace, AppError> {
        let mut tx = self.pool.begin().await?;

        // Locking the owner's profile row serializes concurrent creates for
        // that owner until commit.
        let tier: Option<String> = sqlx::query_scalar("SELECT tier FROM profiles WHERE id = $1 FOR UPDATE")
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await?;
        if tier.as_deref().and_then(Tier::parse) != Some(Tier::Premium) {
            let owned: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workspaces WHERE owner_id = $1")
                .bind(owner_id)
                .fetch_one(&mut *tx)
                .await?;
            if usize::try_from(owned).unwrap_or(usize::MAX) >= free_limit {
                return Err(AppError::QuotaExceeded { resource: "workspace", limit: free_limit });
            }
        }

        let sql = format!("INSERT INTO workspaces (owner_id, name) VALUES ($1, $2) RETURNING {WORKSPACE_COLUMNS}");
        let row = sqlx::query_as::<_, WorkspaceRow>(&sql)
            .bind(owner_id)
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn update_workspace(&self, id: Uuid, name: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE workspaces SET name = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("workspace", id));
        }
        Ok(())
    }

    async fn delete_workspace(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM workspaces WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("workspace", id));
        }
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Profile::from))
    }

    async fn create_profile(&self, user_id: Uuid) -> Result<Profile, AppError> {
        sqlx::query("INSERT INTO profiles (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        self.get_profile(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("profile", user_id))
    }

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<(), AppError> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new("UPDATE profiles SET updated_at = now()");
        if let Some(ws) = update.current_workspace_id {
            builder.push(", current_workspace_id = ").push_bind(ws);
        }
        if let Some(done) = update.onboarding_complete {
            builder.push(", onboarding_complete = ").push_bind(done);
        }
        builder.push(" WHERE id = ").push_bind(user_id);

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("profile", user_id));
        }
        Ok(())
    }
}
