//! In-process `Backend` with failure injection.
//!
//! Holds the same three tables as Postgres behind one mutex. Every scene
//! write is appended to a log so tests can assert what actually reached the
//! backend and in which order. `fail`/`set_offline` make selected operations
//! return `AppError::Network`, and `set_latency` delays every call so tests
//! under a paused clock can observe in-flight state.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use uuid::Uuid;

use super::{Backend, NewScene, ScenePatch};
use crate::error::AppError;
use crate::model::{Profile, ProfileUpdate, Scene, SharePermission, Tier, Timestamp, Workspace, now_ms};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    ListScenes,
    GetScene,
    InsertScene,
    UpdateScene,
    DeleteScene,
    ListWorkspaces,
    InsertWorkspace,
    UpdateWorkspace,
    DeleteWorkspace,
    GetProfile,
    CreateProfile,
    UpdateProfile,
}

/// One `update_scene` call that reached the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneWrite {
    pub scene_id: Uuid,
    pub patch: ScenePatch,
}

#[derive(Default)]
struct Tables {
    scenes: HashMap<Uuid, Scene>,
    workspaces: HashMap<Uuid, Workspace>,
    profiles: HashMap<Uuid, Profile>,
    failing: HashSet<BackendOp>,
    offline: bool,
    latency: Duration,
    writes: Vec<SceneWrite>,
    calls: HashMap<BackendOp, usize>,
    clock: Timestamp,
}

impl Tables {
    /// Strictly increasing timestamps, even within one millisecond.
    fn tick(&mut self) -> Timestamp {
        self.clock = now_ms().max(self.clock + 1);
        self.clock
    }
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Make `op` fail with a network error until `recover` is called.
    pub fn fail(&self, op: BackendOp) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: BackendOp) {
        self.lock().failing.remove(&op);
    }

    /// Fail every operation.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    #[must_use]
    pub fn scene_writes(&self) -> Vec<SceneWrite> {
        self.lock().writes.clone()
    }

    #[must_use]
    pub fn calls(&self, op: BackendOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn scene(&self, id: Uuid) -> Option<Scene> {
        self.lock().scenes.get(&id).cloned()
    }

    #[must_use]
    pub fn scenes_in(&self, workspace_id: Uuid) -> Vec<Scene> {
        self.lock()
            .scenes
            .values()
            .filter(|s| s.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn workspaces_of(&self, owner_id: Uuid) -> Vec<Workspace> {
        self.lock()
            .workspaces
            .values()
            .filter(|w| w.owner_id == owner_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn profile(&self, user_id: Uuid) -> Option<Profile> {
        self.lock().profiles.get(&user_id).cloned()
    }

    pub fn seed_profile(&self, profile: Profile) {
        self.lock().profiles.insert(profile.id, profile);
    }

    pub fn seed_workspace(&self, workspace: Workspace) {
        self.lock().workspaces.insert(workspace.id, workspace);
    }

    pub fn seed_scene(&self, scene: Scene) {
        self.lock().scenes.insert(scene.id, scene);
    }

    async fn enter(&self, op: BackendOp) -> Result<(), AppError> {
        let latency = {
            let mut t = self.lock();
            *t.calls.entry(op).or_default() += 1;
            t.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let t = self.lock();
        if t.offline || t.failing.contains(&op) {
            return Err(AppError::Network(format!("{op:?} failed: backend unreachable")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Backend for MemoryBackend {
    async fn list_scenes(&self, workspace_id: Uuid) -> Result<Vec<Scene>, AppError> {
        self.enter(BackendOp::ListScenes).await?;
        let mut scenes = self.scenes_in(workspace_id);
        scenes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(scenes)
    }

    async fn get_scene(&self, id: Uuid) -> Result<Scene, AppError> {
        self.enter(BackendOp::GetScene).await?;
        self.scene(id).ok_or_else(|| AppError::not_found("scene", id))
    }

    async fn insert_scene(&self, scene: NewScene) -> Result<Scene, AppError> {
        self.enter(BackendOp::InsertScene).await?;
        let mut t = self.lock();
        if !t.workspaces.contains_key(&scene.workspace_id) {
            return Err(AppError::not_found("workspace", scene.workspace_id));
        }
        let now = t.tick();
        let row = Scene {
            id: Uuid::new_v4(),
            workspace_id: scene.workspace_id,
            name: scene.name,
            canvas_data: scene.canvas_data,
            widgets: scene.widgets,
            share_token: None,
            share_permission: SharePermission::None,
            created_at: now,
            updated_at: now,
        };
        t.scenes.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_scene(&self, id: Uuid, patch: &ScenePatch) -> Result<(), AppError> {
        self.enter(BackendOp::UpdateScene).await?;
        let mut t = self.lock();
        if let Some(token) = patch.share.as_ref().and_then(|s| s.token.as_deref()) {
            let taken = t
                .scenes
                .values()
                .any(|s| s.id != id && s.share_token.as_deref() == Some(token));
            if taken {
                return Err(AppError::Network("duplicate key value violates unique constraint on share_token".into()));
            }
        }
        let now = t.tick();
        let Some(scene) = t.scenes.get_mut(&id) else {
            return Err(AppError::not_found("scene", id));
        };
        if let Some(name) = &patch.name {
            scene.name.clone_from(name);
        }
        if let Some(canvas) = &patch.canvas_data {
            scene.canvas_data = Some(canvas.clone());
        }
        if let Some(widgets) = &patch.widgets {
            scene.widgets.clone_from(widgets);
        }
        if let Some(share) = &patch.share {
            scene.share_token.clone_from(&share.token);
            scene.share_permission = share.permission;
        }
        scene.updated_at = now;
        t.writes.push(SceneWrite { scene_id: id, patch: patch.clone() });
        Ok(())
    }

    async fn delete_scene(&self, id: Uuid) -> Result<(), AppError> {
        self.enter(BackendOp::DeleteScene).await?;
        self.lock()
            .scenes
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::not_found("scene", id))
    }

    async fn list_workspaces(&self, owner_id: Uuid) -> Result<Vec<Workspace>, AppError> {
        self.enter(BackendOp::ListWorkspaces).await?;
        let mut workspaces = self.workspaces_of(owner_id);
        workspaces.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(workspaces)
    }

    async fn insert_workspace(&self, owner_id: Uuid, name: &str, free_limit: usize) -> Result<Workspace, AppError> {
        self.enter(BackendOp::InsertWorkspace).await?;
        let mut t = self.lock();
        let premium = t.profiles.get(&owner_id).is_some_and(|p| p.tier == Tier::Premium);
        if !premium {
            let owned = t.workspaces.values().filter(|w| w.owner_id == owner_id).count();
            if owned >= free_limit {
                return Err(AppError::QuotaExceeded { resource: "workspace", limit: free_limit });
            }
        }
        let now = t.tick();
        let ws = Workspace { id: Uuid::new_v4(), owner_id, name: name.to_string(), created_at: now, updated_at: now };
        t.workspaces.insert(ws.id, ws.clone());
        Ok(ws)
    }

    async fn update_workspace(&self, id: Uuid, name: &str) -> Result<(), AppError> {
        self.enter(BackendOp::UpdateWorkspace).await?;
        let mut t = self.lock();
        let now = t.tick();
        let ws = t
            .workspaces
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("workspace", id))?;
        ws.name = name.to_string();
        ws.updated_at = now;
        Ok(())
    }

    async fn delete_workspace(&self, id: Uuid) -> Result<(), AppError> {
        self.enter(BackendOp::DeleteWorkspace).await?;
        let mut t = self.lock();
        if t.workspaces.remove(&id).is_none() {
            return Err(AppError::not_found("workspace", id));
        }
        // Mirror the foreign keys: scenes cascade, profile pointers clear.
        t.scenes.retain(|_, s| s.workspace_id != id);
        for profile in t.profiles.values_mut() {
            if profile.current_workspace_id == Some(id) {
                profile.current_workspace_id = None;
            }
        }
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        self.enter(BackendOp::GetProfile).await?;
        Ok(self.profile(user_id))
    }

    async fn create_profile(&self, user_id: Uuid) -> Result<Profile, AppError> {
        self.enter(BackendOp::CreateProfile).await?;
        let mut t = self.lock();
        let profile = t.profiles.entry(user_id).or_insert_with(|| Profile {
            id: user_id,
            tier: Tier::Free,
            current_workspace_id: None,
            onboarding_complete: false,
        });
        Ok(profile.clone())
    }

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<(), AppError> {
        self.enter(BackendOp::UpdateProfile).await?;
        let mut t = self.lock();
        let profile = t
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| AppError::not_found("profile", user_id))?;
        update.apply(profile);
        Ok(())
    }
}
