//! Wire rows and their mapping to domain types.
//!
//! DESIGN
//! ======
//! Snake-case column names exist only here. Each entity has a `FromRow`
//! struct plus `From` conversions in both directions. The `widgets` column
//! has historically held both a JSON array and a JSON-encoded string, so
//! decoding accepts either and falls back to an empty list.

use tracing::warn;
use uuid::Uuid;

use crate::model::{CanvasDocument, Profile, Scene, SharePermission, Tier, Widget, Workspace};

/// Columns selected for every scene read. Timestamps come back as epoch ms.
pub const SCENE_COLUMNS: &str = "id, workspace_id, name, canvas_data, widgets, share_token, share_permission, \
     (EXTRACT(EPOCH FROM created_at) * 1000)::BIGINT AS created_at, \
     (EXTRACT(EPOCH FROM updated_at) * 1000)::BIGINT AS updated_at";

pub const WORKSPACE_COLUMNS: &str = "id, owner_id, name, \
     (EXTRACT(EPOCH FROM created_at) * 1000)::BIGINT AS created_at, \
     (EXTRACT(EPOCH FROM updated_at) * 1000)::BIGINT AS updated_at";

pub const PROFILE_COLUMNS: &str = "id, tier, current_workspace_id, onboarding_complete";

// =============================================================================
// SCENES
// =============================================================================

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SceneRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub canvas_data: Option<serde_json::Value>,
    pub widgets: Option<serde_json::Value>,
    pub share_token: Option<String>,
    pub share_permission: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Decode the `widgets` column, accepting an array or a JSON string.
#[must_use]
pub fn decode_widgets(value: Option<&serde_json::Value>, scene_id: Uuid) -> Vec<Widget> {
    let parsed = match value {
        None | Some(serde_json::Value::Null) => return Vec::new(),
        Some(serde_json::Value::String(s)) => serde_json::from_str::<Vec<Widget>>(s),
        Some(v @ serde_json::Value::Array(_)) => serde_json::from_value::<Vec<Widget>>(v.clone()),
        Some(other) => {
            warn!(%scene_id, kind = json_kind(other), "unexpected widgets column type; using empty list");
            return Vec::new();
        }
    };
    parsed.unwrap_or_else(|e| {
        warn!(%scene_id, error = %e, "failed to decode widgets; using empty list");
        Vec::new()
    })
}

#[must_use]
pub fn encode_widgets(widgets: &[Widget]) -> serde_json::Value {
    serde_json::to_value(widgets).unwrap_or_else(|_| serde_json::json!([]))
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl From<SceneRow> for Scene {
    fn from(row: SceneRow) -> Self {
        let widgets = decode_widgets(row.widgets.as_ref(), row.id);
        let share_permission = row
            .share_permission
            .as_deref()
            .and_then(SharePermission::parse)
            .unwrap_or_default();
        Self {
            id: row.id,
            workspace_id: row.workspace_id,
            name: row.name,
            canvas_data: row.canvas_data.filter(|v| !v.is_null()).map(CanvasDocument),
            widgets,
            share_token: row.share_token,
            share_permission,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<&Scene> for SceneRow {
    fn from(scene: &Scene) -> Self {
        Self {
            id: scene.id,
            workspace_id: scene.workspace_id,
            name: scene.name.clone(),
            canvas_data: scene.canvas_data.as_ref().map(|c| c.0.clone()),
            widgets: Some(encode_widgets(&scene.widgets)),
            share_token: scene.share_token.clone(),
            share_permission: Some(scene.share_permission.as_str().to_string()),
            created_at: scene.created_at,
            updated_at: scene.updated_at,
        }
    }
}

// =============================================================================
// WORKSPACES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct WorkspaceRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        Self { id: row.id, owner_id: row.owner_id, name: row.name, created_at: row.created_at, updated_at: row.updated_at }
    }
}

impl From<&Workspace> for WorkspaceRow {
    fn from(ws: &Workspace) -> Self {
        Self { id: ws.id, owner_id: ws.owner_id, name: ws.name.clone(), created_at: ws.created_at, updated_at: ws.updated_at }
    }
}

// =============================================================================
// PROFILES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: Uuid,
    pub tier: String,
    pub current_workspace_id: Option<Uuid>,
    pub onboarding_complete: bool,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        let tier = Tier::parse(&row.tier).unwrap_or_else(|| {
            warn!(user_id = %row.id, tier = %row.tier, "unknown tier; treating as free");
            Tier::Free
        });
        Self {
            id: row.id,
            tier,
            current_workspace_id: row.current_workspace_id,
            onboarding_complete: row.onboarding_complete,
        }
    }
}

impl From<&Profile> for ProfileRow {
    fn from(p: &Profile) -> Self {
        Self {
            id: p.id,
            tier: p.tier.as_str().to_string(),
            current_workspace_id: p.current_workspace_id,
            onboarding_complete: p.onboarding_complete,
        }
    }
}

#[cfg(test)]
#[path = "rows_test.rs"]
mod tests;
