//! Domain model: scenes, widgets, workspaces, profiles.
//!
//! DESIGN
//! ======
//! These are the camelCase domain shapes. Snake-case database rows live in
//! `db::rows` and are converted at that boundary only. Anonymous and
//! authenticated scenes are distinct types on purpose: a `LocalScene` has no
//! workspace and cannot be shared. `OwnedScene` joins them where code needs
//! to treat either one as "the scene being edited".

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{WIDGET_DEFAULT_CODE, WIDGET_DEFAULT_HEIGHT, WIDGET_DEFAULT_WIDTH};

/// Milliseconds since Unix epoch.
pub type Timestamp = i64;

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> Timestamp {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// ENUMS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Premium,
}

impl Tier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Self::Free),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }
}

/// Share level of a remote scene. `None` means sharing is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharePermission {
    #[default]
    None,
    View,
    Edit,
}

impl SharePermission {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::View => "view",
            Self::Edit => "edit",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "view" => Some(Self::View),
            "edit" => Some(Self::Edit),
            _ => None,
        }
    }
}

/// Editor language of a widget. Unknown names fall back to JavaScript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    #[default]
    JavaScript,
    Python,
    Html,
    Css,
    Json,
    Java,
    Markdown,
}

impl Language {
    pub const ALL: [Self; 7] =
        [Self::JavaScript, Self::Python, Self::Html, Self::Css, Self::Json, Self::Java, Self::Markdown];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Html => "html",
            Self::Css => "css",
            Self::Json => "json",
            Self::Java => "java",
            Self::Markdown => "markdown",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::JavaScript => "JavaScript",
            Self::Python => "Python",
            Self::Html => "HTML",
            Self::Css => "CSS",
            Self::Json => "JSON",
            Self::Java => "Java",
            Self::Markdown => "Markdown",
        }
    }

    /// Short tag shown in a widget header.
    #[must_use]
    pub fn badge(self) -> &'static str {
        match self {
            Self::JavaScript => "JS",
            Self::Python => "PY",
            Self::Html => "HTML",
            Self::Css => "CSS",
            Self::Json => "JSON",
            Self::Java => "JV",
            Self::Markdown => "MD",
        }
    }
}

impl From<String> for Language {
    fn from(s: String) -> Self {
        Self::ALL
            .into_iter()
            .find(|lang| lang.as_str() == s)
            .unwrap_or_default()
    }
}

impl From<Language> for String {
    fn from(lang: Language) -> Self {
        lang.as_str().to_string()
    }
}

// =============================================================================
// CANVAS DOCUMENT
// =============================================================================

/// View-state keys kept when a drawing change is persisted.
pub const VIEW_STATE_KEYS: [&str; 5] = ["viewBackgroundColor", "currentItemFontFamily", "zoom", "scrollX", "scrollY"];

/// Opaque drawing payload: elements plus a subset of view state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanvasDocument(pub serde_json::Value);

impl CanvasDocument {
    /// Build a persistable document from a drawing engine change event,
    /// keeping only the view-state fields listed in [`VIEW_STATE_KEYS`].
    #[must_use]
    pub fn from_change(elements: serde_json::Value, app_state: &serde_json::Value) -> Self {
        let mut view = serde_json::Map::new();
        for key in VIEW_STATE_KEYS {
            if let Some(v) = app_state.get(key) {
                view.insert(key.to_string(), v.clone());
            }
        }
        Self(serde_json::json!({ "elements": elements, "appState": view }))
    }

    #[must_use]
    pub fn elements(&self) -> Option<&Vec<serde_json::Value>> {
        self.0.get("elements").and_then(serde_json::Value::as_array)
    }

    #[must_use]
    pub fn view_state(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.0.get("appState").and_then(serde_json::Value::as_object)
    }
}

// =============================================================================
// WIDGET
// =============================================================================

/// A positioned code-editor panel. Coordinates are canvas-space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub code: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub is_minimized: bool,
}

impl Widget {
    /// New widget with default size, code stub and language.
    #[must_use]
    pub fn new(id: String, x: f64, y: f64) -> Self {
        Self {
            id,
            x,
            y,
            width: WIDGET_DEFAULT_WIDTH,
            height: WIDGET_DEFAULT_HEIGHT,
            code: WIDGET_DEFAULT_CODE.to_string(),
            language: Language::default(),
            is_minimized: false,
        }
    }

    /// Merge a partial update. Absent fields are left untouched.
    pub fn apply(&mut self, patch: &WidgetPatch) {
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(w) = patch.width {
            self.width = w;
        }
        if let Some(h) = patch.height {
            self.height = h;
        }
        if let Some(code) = &patch.code {
            self.code.clone_from(code);
        }
        if let Some(lang) = patch.language {
            self.language = lang;
        }
        if let Some(min) = patch.is_minimized {
            self.is_minimized = min;
        }
    }
}

/// Merge patch for a widget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub code: Option<String>,
    pub language: Option<Language>,
    pub is_minimized: Option<bool>,
}

impl WidgetPatch {
    #[must_use]
    pub fn position(x: f64, y: f64) -> Self {
        Self { x: Some(x), y: Some(y), ..Self::default() }
    }

    #[must_use]
    pub fn size(width: f64, height: f64) -> Self {
        Self { width: Some(width), height: Some(height), ..Self::default() }
    }

    #[must_use]
    pub fn code(code: impl Into<String>) -> Self {
        Self { code: Some(code.into()), ..Self::default() }
    }

    #[must_use]
    pub fn is_resize(&self) -> bool {
        self.width.is_some() || self.height.is_some()
    }
}

// =============================================================================
// SCENES
// =============================================================================

/// A whiteboard owned by a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub canvas_data: Option<CanvasDocument>,
    pub widgets: Vec<Widget>,
    pub share_token: Option<String>,
    pub share_permission: SharePermission,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Scene {
    /// Sharing is enabled when a token exists and permission is not `none`.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.share_token.is_some() && self.share_permission != SharePermission::None
    }
}

/// The anonymous session's single scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalScene {
    pub id: String,
    pub name: String,
    pub canvas_data: Option<CanvasDocument>,
    pub widgets: Vec<Widget>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl LocalScene {
    /// True when there is anything worth importing into an account.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.canvas_data.is_some() || !self.widgets.is_empty()
    }
}

/// Partial update for the local scene.
#[derive(Debug, Clone, Default)]
pub struct LocalScenePatch {
    pub name: Option<String>,
    pub canvas_data: Option<CanvasDocument>,
    pub widgets: Option<Vec<Widget>>,
}

/// Partial update for a remote scene, written synchronously.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneUpdate {
    pub name: Option<String>,
    pub canvas_data: Option<CanvasDocument>,
    pub widgets: Option<Vec<Widget>>,
}

impl SceneUpdate {
    #[must_use]
    pub fn rename(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }
}

/// Hot-path payload for `SceneStore::save_scene_data`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneData {
    pub canvas_data: Option<CanvasDocument>,
    pub widgets: Option<Vec<Widget>>,
}

/// Content carried from the local scene into a new remote scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationSnapshot {
    pub canvas_data: Option<CanvasDocument>,
    pub widgets: Vec<Widget>,
}

/// The scene a user is editing, anonymous or authenticated.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedScene {
    Local(LocalScene),
    Remote(Scene),
}

impl OwnedScene {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Local(s) => &s.name,
            Self::Remote(s) => &s.name,
        }
    }

    #[must_use]
    pub fn widgets(&self) -> &[Widget] {
        match self {
            Self::Local(s) => &s.widgets,
            Self::Remote(s) => &s.widgets,
        }
    }

    #[must_use]
    pub fn canvas_data(&self) -> Option<&CanvasDocument> {
        match self {
            Self::Local(s) => s.canvas_data.as_ref(),
            Self::Remote(s) => s.canvas_data.as_ref(),
        }
    }

    #[must_use]
    pub fn updated_at(&self) -> Timestamp {
        match self {
            Self::Local(s) => s.updated_at,
            Self::Remote(s) => s.updated_at,
        }
    }
}

// =============================================================================
// WORKSPACE / PROFILE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub tier: Tier,
    pub current_workspace_id: Option<Uuid>,
    pub onboarding_complete: bool,
}

/// Explicit profile mutation. `current_workspace_id: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub current_workspace_id: Option<Option<Uuid>>,
    pub onboarding_complete: Option<bool>,
}

impl ProfileUpdate {
    pub fn apply(&self, profile: &mut Profile) {
        if let Some(ws) = self.current_workspace_id {
            profile.current_workspace_id = ws;
        }
        if let Some(done) = self.onboarding_complete {
            profile.onboarding_complete = done;
        }
    }
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
