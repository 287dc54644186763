//! Local scene store: the anonymous session's single scene.
//!
//! DESIGN
//! ======
//! One slot, not a collection. Every mutation updates memory first and then
//! rewrites the whole `{ "scene": ... }` record in durable storage before
//! returning. There are no suspension points here, so callers may use the
//! store from synchronous code.
//!
//! ERROR HANDLING
//! ==============
//! A storage write failure never loses the in-memory edit: it is logged and
//! recorded on `error`, and the next successful mutation rewrites the full
//! record. A corrupt record on startup loads as an empty store.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_LOCAL_SCENE_NAME;
use crate::error::AppError;
use crate::ids;
use crate::model::{CanvasDocument, LocalScene, LocalScenePatch, MigrationSnapshot, Timestamp, Widget, WidgetPatch, now_ms};
use crate::storage::LocalStorage;

/// Key of the durable record.
pub const LOCAL_SCENE_KEY: &str = "codeboard-local-scene";

#[derive(Debug, Default, Serialize, Deserialize)]
struct LocalRecord {
    scene: Option<LocalScene>,
}

#[derive(Default)]
struct LocalState {
    scene: Option<LocalScene>,
    error: Option<String>,
}

pub struct LocalSceneStore {
    storage: Arc<dyn LocalStorage>,
    state: Mutex<LocalState>,
}

/// Strictly later than `previous`, so back-to-back edits still order.
fn bump(previous: Timestamp) -> Timestamp {
    now_ms().max(previous + 1)
}

impl LocalSceneStore {
    /// Open the store, restoring any scene persisted by a previous run.
    pub fn open(storage: Arc<dyn LocalStorage>) -> Self {
        let scene = match storage.load(LOCAL_SCENE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<LocalRecord>(&raw) {
                Ok(record) => record.scene,
                Err(e) => {
                    warn!(error = %e, "local scene record is corrupt; starting empty");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "local scene record unreadable; starting empty");
                None
            }
        };
        if let Some(scene) = &scene {
            info!(scene_id = %scene.id, widgets = scene.widgets.len(), "restored local scene");
        }
        Self { storage, state: Mutex::new(LocalState { scene, error: None }) }
    }

    fn lock(&self) -> MutexGuard<'_, LocalState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Write the current slot to durable storage. Caller holds the lock so
    /// the record always matches the state it was taken from.
    fn persist(&self, state: &mut LocalState) {
        let record = LocalRecord { scene: state.scene.clone() };
        let result = serde_json::to_string(&record)
            .map_err(AppError::from)
            .and_then(|json| self.storage.save(LOCAL_SCENE_KEY, &json));
        match result {
            Ok(()) => state.error = None,
            Err(e) => {
                error!(error = %e, "failed to persist local scene");
                state.error = Some(e.to_string());
            }
        }
    }

    /// Apply `f` to the scene and persist. `false` if there is no scene.
    fn mutate(&self, f: impl FnOnce(&mut LocalScene) -> bool) -> bool {
        let mut state = self.lock();
        let Some(scene) = state.scene.as_mut() else {
            return false;
        };
        if !f(scene) {
            return false;
        }
        scene.updated_at = bump(scene.updated_at);
        self.persist(&mut state);
        true
    }

    // =========================================================================
    // READ
    // =========================================================================

    #[must_use]
    pub fn scene(&self) -> Option<LocalScene> {
        self.lock().scene.clone()
    }

    #[must_use]
    pub fn has_scene(&self) -> bool {
        self.lock().scene.is_some()
    }

    /// Last storage failure, cleared by the next successful write.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Content to carry into a new remote scene during onboarding.
    #[must_use]
    pub fn migration_snapshot(&self) -> Option<MigrationSnapshot> {
        self.lock().scene.as_ref().map(|s| MigrationSnapshot {
            canvas_data: s.canvas_data.clone(),
            widgets: s.widgets.clone(),
        })
    }

    // =========================================================================
    // WRITE
    // =========================================================================

    /// Create a fresh scene, replacing any existing one. Returns its id.
    pub fn create_scene(&self, name: Option<&str>) -> String {
        let now = now_ms();
        let scene = LocalScene {
            id: ids::local_scene_id(),
            name: name.unwrap_or(DEFAULT_LOCAL_SCENE_NAME).to_string(),
            canvas_data: None,
            widgets: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let id = scene.id.clone();

        let mut state = self.lock();
        if let Some(previous) = &state.scene {
            debug!(previous = %previous.id, "replacing local scene");
        }
        state.scene = Some(scene);
        self.persist(&mut state);
        info!(scene_id = %id, "created local scene");
        id
    }

    /// Merge `patch` into the scene. No-op without a scene.
    pub fn update_scene(&self, patch: LocalScenePatch) {
        self.mutate(|scene| {
            if let Some(name) = patch.name {
                scene.name = name;
            }
            if let Some(canvas) = patch.canvas_data {
                scene.canvas_data = Some(canvas);
            }
            if let Some(widgets) = patch.widgets {
                scene.widgets = widgets;
            }
            true
        });
    }

    /// Replace the drawing payload only; widgets are untouched.
    pub fn save_canvas_data(&self, canvas: CanvasDocument) {
        self.mutate(|scene| {
            scene.canvas_data = Some(canvas);
            true
        });
    }

    /// Append a default widget at canvas position `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NoScene` if no scene has been created yet.
    pub fn add_widget(&self, x: f64, y: f64) -> Result<String, AppError> {
        let id = ids::widget_id();
        let widget = Widget::new(id.clone(), x, y);
        if !self.mutate(|scene| {
            scene.widgets.push(widget);
            true
        }) {
            return Err(AppError::NoScene);
        }
        debug!(widget_id = %id, x, y, "added local widget");
        Ok(id)
    }

    /// Merge `patch` into widget `id`. The scene's `updated_at` is bumped
    /// whenever a scene exists, even when `id` matches no widget; the widget
    /// list is then left as is.
    pub fn update_widget(&self, id: &str, patch: &WidgetPatch) {
        self.mutate(|scene| {
            if let Some(widget) = scene.widgets.iter_mut().find(|w| w.id == id) {
                widget.apply(patch);
            }
            true
        });
    }

    /// Remove widget `id`. Bumps `updated_at` like `update_widget`, unknown
    /// ids included.
    pub fn remove_widget(&self, id: &str) {
        self.mutate(|scene| {
            scene.widgets.retain(|w| w.id != id);
            true
        });
    }

    /// Destroy the scene. Only call once migrated content is durable remotely.
    pub fn clear(&self) {
        let mut state = self.lock();
        if let Some(scene) = state.scene.take() {
            info!(scene_id = %scene.id, "cleared local scene");
        }
        self.persist(&mut state);
    }
}

#[cfg(test)]
#[path = "local_scene_test.rs"]
mod tests;
