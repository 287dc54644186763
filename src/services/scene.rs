//! Remote scene store: an authenticated user's scenes in one workspace.
//!
//! DESIGN
//! ======
//! The in-memory list is the single shared copy every caller reads. All
//! mutation goes through this store. `save_scene_data` is the hot path and
//! applies edits optimistically before any write is scheduled:
//!
//! - widget lists are written at once on a spawned task, one write at a
//!   time per store; a list superseded before its turn is skipped
//! - canvas data goes through one trailing debounce owned by this store
//!
//! The debounce slot is per store, not per scene. Scheduling canvas data for
//! scene B while scene A's write is pending drops A's write, so only one
//! scene may be actively edited per store at a time.
//!
//! ERROR HANDLING
//! ==============
//! Backend failures never reach the caller as `Err`. Each one is logged,
//! recorded on `error`, and pushed as a toast. Failed saves keep the
//! optimistic state and mark the scene `unsynced` until a later write of
//! that scene succeeds.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DEFAULT_SCENE_NAME;
use crate::db::{Backend, NewScene, ScenePatch};
use crate::debounce::Debouncer;
use crate::error::{AppError, ErrorCode};
use crate::model::{MigrationSnapshot, Scene, SceneData, SceneUpdate, SharePermission, Widget, now_ms};
use crate::notify::{self, Notifier};

/// Result of fetching a single scene.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Found(Scene),
    /// The id does not exist (or is no longer visible to this user).
    NotFound,
    /// The backend could not be reached; `error` holds the reason.
    Failed,
}

#[derive(Default)]
struct SceneState {
    scenes: Vec<Scene>,
    current: Option<Uuid>,
    is_loading: bool,
    is_saving: bool,
    error: Option<String>,
    unsynced: HashSet<Uuid>,
}

impl SceneState {
    fn find_mut(&mut self, id: Uuid) -> Option<&mut Scene> {
        self.scenes.iter_mut().find(|s| s.id == id)
    }

    fn upsert(&mut self, scene: Scene) {
        match self.find_mut(scene.id) {
            Some(existing) => *existing = scene,
            None => self.scenes.push(scene),
        }
    }
}

struct Inner {
    backend: Arc<dyn Backend>,
    notifier: Notifier,
    state: Mutex<SceneState>,
    canvas_debounce: Debouncer,
    /// Latest widget-list sequence issued per scene. Survives `reset` so a
    /// write still queued from before cannot pass for a newer one.
    widget_seq: Mutex<HashMap<Uuid, u64>>,
    /// Held across each widget write so they reach the backend one at a time.
    widget_gate: tokio::sync::Mutex<()>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SceneState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn fail(&self, toast: &str, e: &AppError) {
        self.lock().error = Some(e.to_string());
        self.notifier.error(toast);
    }

    fn next_widget_seq(&self, id: Uuid) -> u64 {
        let mut seqs = self
            .widget_seq
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let seq = seqs.entry(id).or_default();
        *seq += 1;
        *seq
    }

    fn latest_widget_seq(&self, id: Uuid) -> u64 {
        self.widget_seq
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&id)
            .copied()
            .unwrap_or_default()
    }

    /// Write widget list `seq` of scene `id`. Writes run one at a time, and a
    /// list already superseded by a newer one is skipped, so the backend can
    /// never end up holding an older list than the last one issued.
    async fn write_widgets(&self, id: Uuid, seq: u64, widgets: Vec<Widget>) {
        let _gate = self.widget_gate.lock().await;
        if seq < self.latest_widget_seq(id) {
            debug!(scene_id = %id, seq, "superseded widget write skipped");
            return;
        }
        self.write(id, ScenePatch::widgets(widgets), false).await;
    }

    /// Send one scene patch and record the outcome. `settles_canvas` marks
    /// the debounced canvas write, which owns the `is_saving` flag.
    async fn write(&self, id: Uuid, patch: ScenePatch, settles_canvas: bool) {
        let result = self.backend.update_scene(id, &patch).await;

        let mut state = self.lock();
        if settles_canvas && !self.canvas_debounce.is_pending() {
            state.is_saving = false;
        }
        match result {
            Ok(()) => {
                if state.unsynced.remove(&id) {
                    info!(scene_id = %id, "scene back in sync");
                }
            }
            Err(e) => {
                error!(scene_id = %id, code = e.error_code(), error = %e, "scene save failed");
                state.error = Some(e.to_string());
                state.unsynced.insert(id);
                drop(state);
                self.notifier.error(notify::SCENE_SAVE_FAILED);
            }
        }
    }
}

#[derive(Clone)]
pub struct SceneStore {
    inner: Arc<Inner>,
}

impl SceneStore {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, notifier: Notifier, save_debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                notifier,
                state: Mutex::new(SceneState::default()),
                canvas_debounce: Debouncer::new(save_debounce),
                widget_seq: Mutex::new(HashMap::new()),
                widget_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    // =========================================================================
    // READ
    // =========================================================================

    /// Scenes in display order.
    #[must_use]
    pub fn scenes(&self) -> Vec<Scene> {
        self.inner.lock().scenes.clone()
    }

    #[must_use]
    pub fn scene(&self, id: Uuid) -> Option<Scene> {
        self.inner.lock().scenes.iter().find(|s| s.id == id).cloned()
    }

    #[must_use]
    pub fn current_scene(&self) -> Option<Scene> {
        let state = self.inner.lock();
        let id = state.current?;
        state.scenes.iter().find(|s| s.id == id).cloned()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.lock().is_loading
    }

    /// True from scheduling a canvas write until it settles.
    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.inner.lock().is_saving
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    /// True when the last write of `id` failed and none has succeeded since.
    #[must_use]
    pub fn is_unsynced(&self, id: Uuid) -> bool {
        self.inner.lock().unsynced.contains(&id)
    }

    pub fn clear_error(&self) {
        self.inner.lock().error = None;
    }

    /// Drop all state and any pending canvas write. A write already handed
    /// to the backend still completes.
    pub fn reset(&self) {
        self.inner.canvas_debounce.cancel();
        *self.inner.lock() = SceneState::default();
    }

    // =========================================================================
    // FETCH
    // =========================================================================

    /// Replace the list with the workspace's scenes, newest first.
    pub async fn fetch_scenes(&self, workspace_id: Uuid) -> bool {
        {
            let mut state = self.inner.lock();
            state.is_loading = true;
            state.error = None;
        }

        let result = self.inner.backend.list_scenes(workspace_id).await;

        let mut state = self.inner.lock();
        state.is_loading = false;
        match result {
            Ok(mut scenes) => {
                scenes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                debug!(%workspace_id, count = scenes.len(), "fetched scenes");
                if state.current.is_some_and(|id| !scenes.iter().any(|s| s.id == id)) {
                    state.current = None;
                }
                state.scenes = scenes;
                true
            }
            Err(e) => {
                error!(%workspace_id, error = %e, "fetch scenes failed");
                drop(state);
                self.inner.fail(notify::SCENE_FETCH_FAILED, &e);
                false
            }
        }
    }

    /// Fetch one scene, upsert it into the list and make it current.
    pub async fn fetch_scene(&self, id: Uuid) -> FetchOutcome {
        {
            let mut state = self.inner.lock();
            state.is_loading = true;
            state.error = None;
        }

        let result = self.inner.backend.get_scene(id).await;

        let mut state = self.inner.lock();
        state.is_loading = false;
        match result {
            Ok(scene) => {
                state.upsert(scene.clone());
                state.current = Some(id);
                FetchOutcome::Found(scene)
            }
            Err(e) if e.is_not_found() => {
                warn!(scene_id = %id, "scene not found");
                // A stale cached copy must not stand in for a missing row.
                state.scenes.retain(|s| s.id != id);
                if state.current == Some(id) {
                    state.current = None;
                }
                drop(state);
                self.inner.fail(notify::SCENE_NOT_FOUND, &e);
                FetchOutcome::NotFound
            }
            Err(e) => {
                error!(scene_id = %id, error = %e, "fetch scene failed");
                drop(state);
                self.inner.fail(notify::SCENE_FETCH_FAILED, &e);
                FetchOutcome::Failed
            }
        }
    }

    // =========================================================================
    // WRITE
    // =========================================================================

    /// Insert a scene, optionally pre-filled from a migration snapshot.
    /// The new scene is prepended and becomes current.
    pub async fn create_scene(
        &self,
        workspace_id: Uuid,
        name: Option<&str>,
        seed: Option<MigrationSnapshot>,
    ) -> Option<Scene> {
        {
            let mut state = self.inner.lock();
            state.is_loading = true;
            state.error = None;
        }

        let seed = seed.unwrap_or_default();
        let new_scene = NewScene {
            workspace_id,
            name: name.unwrap_or(DEFAULT_SCENE_NAME).to_string(),
            canvas_data: seed.canvas_data,
            widgets: seed.widgets,
        };
        let result = self.inner.backend.insert_scene(new_scene).await;

        let mut state = self.inner.lock();
        state.is_loading = false;
        match result {
            Ok(scene) => {
                info!(scene_id = %scene.id, %workspace_id, widgets = scene.widgets.len(), "created scene");
                state.scenes.insert(0, scene.clone());
                state.current = Some(scene.id);
                Some(scene)
            }
            Err(e) => {
                error!(%workspace_id, error = %e, "create scene failed");
                drop(state);
                self.inner.fail(notify::SCENE_CREATE_FAILED, &e);
                None
            }
        }
    }

    /// Write `update` now and apply it locally once the backend accepts it.
    pub async fn update_scene(&self, id: Uuid, update: SceneUpdate) -> bool {
        self.inner.lock().error = None;

        let patch = ScenePatch {
            name: update.name.clone(),
            canvas_data: update.canvas_data.clone(),
            widgets: update.widgets.clone(),
            share: None,
        };
        match self.inner.backend.update_scene(id, &patch).await {
            Ok(()) => {
                let mut state = self.inner.lock();
                state.unsynced.remove(&id);
                if let Some(scene) = state.find_mut(id) {
                    if let Some(name) = update.name {
                        scene.name = name;
                    }
                    if let Some(canvas) = update.canvas_data {
                        scene.canvas_data = Some(canvas);
                    }
                    if let Some(widgets) = update.widgets {
                        scene.widgets = widgets;
                    }
                    scene.updated_at = now_ms();
                }
                true
            }
            Err(e) => {
                error!(scene_id = %id, error = %e, "update scene failed");
                self.inner.fail(notify::SCENE_SAVE_FAILED, &e);
                false
            }
        }
    }

    /// Hot path for drawing and widget edits. Applies `data` immediately,
    /// writes widgets right away, and debounces canvas data.
    ///
    /// Must be called from within a tokio runtime.
    pub fn save_scene_data(&self, id: Uuid, data: SceneData) {
        let widget_seq = {
            let mut state = self.inner.lock();
            if let Some(scene) = state.find_mut(id) {
                if let Some(canvas) = &data.canvas_data {
                    scene.canvas_data = Some(canvas.clone());
                }
                if let Some(widgets) = &data.widgets {
                    scene.widgets.clone_from(widgets);
                }
                scene.updated_at = now_ms();
            }
            if data.canvas_data.is_some() {
                state.is_saving = true;
            }
            // Sequenced under the state lock so backend order follows the
            // order edits were applied locally.
            data.widgets.as_ref().map(|_| self.inner.next_widget_seq(id))
        };

        if let (Some(widgets), Some(seq)) = (data.widgets, widget_seq) {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                inner.write_widgets(id, seq, widgets).await;
            });
        }

        if let Some(canvas) = data.canvas_data {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            let replaced = self.inner.canvas_debounce.schedule(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.write(id, ScenePatch::canvas(canvas), true).await;
                }
            });
            if replaced {
                debug!(scene_id = %id, "canvas save rescheduled");
            }
        }
    }

    /// Delete a scene. If it was current, nothing is current afterwards.
    pub async fn delete_scene(&self, id: Uuid) -> bool {
        self.inner.lock().error = None;

        match self.inner.backend.delete_scene(id).await {
            Ok(()) => {
                info!(scene_id = %id, "deleted scene");
                let mut state = self.inner.lock();
                state.scenes.retain(|s| s.id != id);
                state.unsynced.remove(&id);
                if state.current == Some(id) {
                    state.current = None;
                }
                true
            }
            Err(e) => {
                error!(scene_id = %id, error = %e, "delete scene failed");
                self.inner.fail(notify::SCENE_DELETE_FAILED, &e);
                false
            }
        }
    }

    /// Select an already-fetched scene. Unknown ids are ignored; `None`
    /// clears the selection. Switching scenes drops any pending canvas write.
    pub fn set_current_scene(&self, id: Option<Uuid>) {
        let mut state = self.inner.lock();
        match id {
            None => state.current = None,
            Some(id) if state.scenes.iter().any(|s| s.id == id) => {
                if state.current != Some(id) && self.inner.canvas_debounce.cancel() {
                    debug!(scene_id = %id, "scene switch dropped pending canvas save");
                    state.is_saving = false;
                }
                state.current = Some(id);
            }
            Some(id) => debug!(scene_id = %id, "set_current_scene ignored unknown id"),
        }
    }

    // =========================================================================
    // SHARE STATE
    // =========================================================================

    pub(crate) fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    pub(crate) fn record_error(&self, toast: &str, e: &AppError) {
        self.inner.fail(toast, e);
    }

    /// Mirror a committed share-state change into the cached copy.
    pub(crate) fn apply_share(&self, id: Uuid, token: Option<String>, permission: SharePermission) {
        let mut state = self.inner.lock();
        if let Some(scene) = state.find_mut(id) {
            scene.share_token = token;
            scene.share_permission = permission;
            scene.updated_at = now_ms();
        }
    }
}

#[cfg(test)]
#[path = "scene_test.rs"]
mod tests;
