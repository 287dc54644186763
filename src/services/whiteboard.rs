//! Whiteboard controller: routes every edit to the store that owns the scene.
//!
//! DESIGN
//! ======
//! The caller picks the session mode; it is never inferred from data. Scene
//! source priority is fixed:
//!
//! 1. a shared scene loaded through a share token (read-only)
//! 2. the local store's singleton (anonymous)
//! 3. the remote store's scene (signed-in owner)
//!
//! Raw drawing events are collapsed by a 500ms debounce owned by this
//! controller before reaching a store. The remote store then applies its own
//! 1000ms canvas debounce; widget edits skip both and go straight through.
//!
//! Quota and resize bounds are enforced here, at the mutation boundary.
//! Per-widget callbacks are handed out as memoized `WidgetBinding`s so a
//! widget keeps the same handle for its whole lifetime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Limits, WIDGET_DEFAULT_HEIGHT, WIDGET_DEFAULT_WIDTH};
use crate::debounce::Debouncer;
use crate::error::AppError;
use crate::ids;
use crate::model::{CanvasDocument, LocalScenePatch, OwnedScene, Scene, SceneData, SceneUpdate, SharePermission, Tier, Widget, WidgetPatch};
use crate::services::local_scene::LocalSceneStore;
use crate::services::scene::SceneStore;
use crate::state::AppState;

/// Who is looking at the board, decided by the route.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionMode {
    Anonymous,
    Owner { scene_id: Uuid },
    SharedViewer { scene: Scene, permission: SharePermission },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneSource {
    Shared,
    Local,
    Remote,
}

/// Visible area in canvas units. Bounds widget resizing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280.0, height: 800.0 }
    }
}

impl Viewport {
    /// Position that centers a default-sized widget.
    #[must_use]
    pub fn spawn_point(&self) -> (f64, f64) {
        (self.width / 2.0 - WIDGET_DEFAULT_WIDTH / 2.0, self.height / 2.0 - WIDGET_DEFAULT_HEIGHT / 2.0)
    }
}

/// Clamp one dimension into `[min, max]`. NaN lands on `min`; a viewport
/// smaller than `min` still allows `min`.
fn clamp_dimension(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max.max(min))
}

/// Read-modify-write of a remote scene's widget list. The new list goes
/// through the store's immediate widget write.
fn mutate_remote_widgets(
    store: &SceneStore,
    scene_id: Uuid,
    f: impl FnOnce(&mut Vec<Widget>) -> bool,
) -> Result<(), AppError> {
    let mut widgets = store
        .scene(scene_id)
        .ok_or_else(|| AppError::not_found("scene", scene_id))?
        .widgets;
    if f(&mut widgets) {
        store.save_scene_data(scene_id, SceneData { canvas_data: None, widgets: Some(widgets) });
    }
    Ok(())
}

enum Target {
    Local(Arc<LocalSceneStore>),
    Remote(SceneStore, Uuid),
}

struct Inner {
    mode: SessionMode,
    local: Arc<LocalSceneStore>,
    remote: SceneStore,
    limits: Limits,
    tier: Mutex<Tier>,
    viewport: Mutex<Viewport>,
    change_debounce: Debouncer,
    bindings: Mutex<HashMap<String, Arc<WidgetBinding>>>,
}

impl Inner {
    fn bindings(&self) -> MutexGuard<'_, HashMap<String, Arc<WidgetBinding>>> {
        self.bindings
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn tier(&self) -> Tier {
        *self.tier.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn viewport(&self) -> Viewport {
        *self
            .viewport
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn target(&self) -> Result<Target, AppError> {
        match &self.mode {
            SessionMode::SharedViewer { .. } => Err(AppError::ReadOnly),
            SessionMode::Anonymous => Ok(Target::Local(self.local.clone())),
            SessionMode::Owner { scene_id } => Ok(Target::Remote(self.remote.clone(), *scene_id)),
        }
    }

    fn widgets(&self) -> Vec<Widget> {
        match &self.mode {
            SessionMode::SharedViewer { scene, .. } => scene.widgets.clone(),
            SessionMode::Anonymous => self.local.scene().map(|s| s.widgets).unwrap_or_default(),
            SessionMode::Owner { scene_id } => self.remote.scene(*scene_id).map(|s| s.widgets).unwrap_or_default(),
        }
    }

    fn clamp_patch(&self, patch: &WidgetPatch) -> WidgetPatch {
        if !patch.is_resize() {
            return patch.clone();
        }
        let viewport = self.viewport();
        let mut clamped = patch.clone();
        clamped.width = patch
            .width
            .map(|w| clamp_dimension(w, self.limits.min_widget_width, viewport.width));
        clamped.height = patch
            .height
            .map(|h| clamp_dimension(h, self.limits.min_widget_height, viewport.height));
        clamped
    }

    fn update_widget(&self, id: &str, patch: &WidgetPatch) -> Result<(), AppError> {
        let patch = self.clamp_patch(patch);
        match self.target()? {
            Target::Local(store) => {
                store.update_widget(id, &patch);
                Ok(())
            }
            Target::Remote(store, scene_id) => mutate_remote_widgets(&store, scene_id, |widgets| {
                let Some(widget) = widgets.iter_mut().find(|w| w.id == id) else {
                    return false;
                };
                widget.apply(&patch);
                true
            }),
        }
    }

    fn remove_widget(&self, id: &str) -> Result<(), AppError> {
        match self.target()? {
            Target::Local(store) => store.remove_widget(id),
            Target::Remote(store, scene_id) => mutate_remote_widgets(&store, scene_id, |widgets| {
                let before = widgets.len();
                widgets.retain(|w| w.id != id);
                widgets.len() != before
            })?,
        }
        self.bindings().remove(id);
        Ok(())
    }
}

/// Stable per-widget callbacks. One instance per widget id for as long as
/// the widget exists on this board.
pub struct WidgetBinding {
    widget_id: String,
    board: Weak<Inner>,
}

impl WidgetBinding {
    #[must_use]
    pub fn widget_id(&self) -> &str {
        &self.widget_id
    }

    /// Same as `Whiteboard::update_widget` for this widget. A no-op once the
    /// board is gone.
    ///
    /// # Errors
    ///
    /// `AppError::ReadOnly` on a shared board.
    pub fn update(&self, patch: &WidgetPatch) -> Result<(), AppError> {
        match self.board.upgrade() {
            Some(board) => board.update_widget(&self.widget_id, patch),
            None => Ok(()),
        }
    }

    /// Same as `Whiteboard::remove_widget` for this widget.
    ///
    /// # Errors
    ///
    /// `AppError::ReadOnly` on a shared board.
    pub fn remove(&self) -> Result<(), AppError> {
        match self.board.upgrade() {
            Some(board) => board.remove_widget(&self.widget_id),
            None => Ok(()),
        }
    }
}

pub struct Whiteboard {
    inner: Arc<Inner>,
}

impl Whiteboard {
    /// Open a board for `mode`. Anonymous boards create the local scene on
    /// first visit.
    #[must_use]
    pub fn open(state: &AppState, mode: SessionMode, tier: Tier) -> Self {
        if matches!(mode, SessionMode::Anonymous) && !state.local.has_scene() {
            let id = state.local.create_scene(None);
            info!(scene_id = %id, "created local scene on first visit");
        }
        Self {
            inner: Arc::new(Inner {
                mode,
                local: state.local.clone(),
                remote: state.scenes.clone(),
                limits: state.limits,
                tier: Mutex::new(tier),
                viewport: Mutex::new(Viewport::default()),
                change_debounce: Debouncer::new(state.limits.change_debounce),
                bindings: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn source(&self) -> SceneSource {
        match self.inner.mode {
            SessionMode::SharedViewer { .. } => SceneSource::Shared,
            SessionMode::Anonymous => SceneSource::Local,
            SessionMode::Owner { .. } => SceneSource::Remote,
        }
    }

    /// Shared boards never expose mutation paths, whatever the permission.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.source() == SceneSource::Shared
    }

    /// The scene being shown, from the active source only.
    #[must_use]
    pub fn scene(&self) -> Option<OwnedScene> {
        match &self.inner.mode {
            SessionMode::SharedViewer { scene, .. } => Some(OwnedScene::Remote(scene.clone())),
            SessionMode::Anonymous => self.inner.local.scene().map(OwnedScene::Local),
            SessionMode::Owner { scene_id } => self.inner.remote.scene(*scene_id).map(OwnedScene::Remote),
        }
    }

    /// Widgets in render order.
    #[must_use]
    pub fn widgets(&self) -> Vec<Widget> {
        self.inner.widgets()
    }

    pub fn set_tier(&self, tier: Tier) {
        *self.inner.tier.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = tier;
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        *self
            .inner
            .viewport
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = viewport;
    }

    /// Free tier holds at most `max_widgets_free` widgets per scene.
    #[must_use]
    pub fn can_add_widget(&self) -> bool {
        !self.is_read_only()
            && (self.inner.tier() == Tier::Premium || self.widgets().len() < self.inner.limits.max_widgets_free)
    }

    /// Feed a raw drawing change. Only the last change in a quiet window is
    /// handed to the owning store.
    ///
    /// # Errors
    ///
    /// `AppError::ReadOnly` on a shared board.
    pub fn on_canvas_change(&self, elements: serde_json::Value, app_state: &serde_json::Value) -> Result<(), AppError> {
        let target = self.inner.target()?;
        let document = CanvasDocument::from_change(elements, app_state);
        self.inner.change_debounce.schedule(async move {
            match target {
                Target::Local(store) => store.save_canvas_data(document),
                Target::Remote(store, scene_id) => {
                    store.save_scene_data(scene_id, SceneData { canvas_data: Some(document), widgets: None });
                }
            }
        });
        Ok(())
    }

    /// Add a default widget at canvas position `(x, y)`. `Ok(None)` when the
    /// tier quota refuses it.
    ///
    /// # Errors
    ///
    /// `AppError::ReadOnly` on a shared board, `AppError::NoScene` /
    /// `AppError::NotFound` when the owning scene is missing.
    pub fn add_widget(&self, x: f64, y: f64) -> Result<Option<String>, AppError> {
        let target = self.inner.target()?;
        if !self.can_add_widget() {
            debug!(limit = self.inner.limits.max_widgets_free, "widget quota reached; add refused");
            return Ok(None);
        }
        let id = match target {
            Target::Local(store) => store.add_widget(x, y)?,
            Target::Remote(store, scene_id) => {
                let id = ids::widget_id();
                let widget = Widget::new(id.clone(), x, y);
                mutate_remote_widgets(&store, scene_id, |widgets| {
                    widgets.push(widget);
                    true
                })?;
                id
            }
        };
        Ok(Some(id))
    }

    /// Add a widget centered in the current viewport.
    ///
    /// # Errors
    ///
    /// Same as [`Whiteboard::add_widget`].
    pub fn add_widget_at_center(&self) -> Result<Option<String>, AppError> {
        let (x, y) = self.inner.viewport().spawn_point();
        self.add_widget(x, y)
    }

    /// Merge `patch` into a widget. Sizes are clamped to the minimum and
    /// the viewport first.
    ///
    /// # Errors
    ///
    /// `AppError::ReadOnly` on a shared board.
    pub fn update_widget(&self, id: &str, patch: &WidgetPatch) -> Result<(), AppError> {
        self.inner.update_widget(id, patch)
    }

    /// # Errors
    ///
    /// `AppError::ReadOnly` on a shared board.
    pub fn remove_widget(&self, id: &str) -> Result<(), AppError> {
        self.inner.remove_widget(id)
    }

    /// Rename the scene. Remote scenes are written immediately.
    ///
    /// # Errors
    ///
    /// `AppError::ReadOnly` on a shared board, `AppError::Validation` for a
    /// blank name.
    pub async fn rename(&self, name: &str) -> Result<bool, AppError> {
        let target = self.inner.target()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("name", "Scene name cannot be empty"));
        }
        match target {
            Target::Local(store) => {
                store.update_scene(LocalScenePatch { name: Some(name.to_string()), ..LocalScenePatch::default() });
                Ok(true)
            }
            Target::Remote(store, scene_id) => Ok(store.update_scene(scene_id, SceneUpdate::rename(name)).await),
        }
    }

    /// Callbacks for one widget. Repeated calls for the same id return the
    /// same instance.
    #[must_use]
    pub fn binding(&self, widget_id: &str) -> Arc<WidgetBinding> {
        self.inner
            .bindings()
            .entry(widget_id.to_string())
            .or_insert_with(|| {
                Arc::new(WidgetBinding { widget_id: widget_id.to_string(), board: Arc::downgrade(&self.inner) })
            })
            .clone()
    }

    /// Tear down: drop the pending drawing change and all bindings. A store
    /// write already scheduled is left alone.
    pub fn dispose(&self) {
        if self.inner.change_debounce.cancel() {
            warn!("board closed with an unsaved drawing change pending");
        }
        self.inner.bindings().clear();
    }
}

impl Drop for Whiteboard {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
#[path = "whiteboard_test.rs"]
mod tests;
