//! User-visible notifications (toasts).
//!
//! Stores push a short-lived `Toast` whenever a backend call fails. Delivery
//! is best-effort over a broadcast channel: with no subscriber the toast is
//! dropped, which is fine because the failure is also logged and recorded on
//! the store's `error` field.

use std::time::Duration;

use tokio::sync::broadcast;

pub const TOAST_DURATION: Duration = Duration::from_millis(4000);
const TOAST_CHANNEL_CAPACITY: usize = 64;

pub const SCENE_SAVE_FAILED: &str = "Failed to save scene. Your changes may not be persisted.";
pub const SCENE_FETCH_FAILED: &str = "Failed to load scenes. Please try again.";
pub const SCENE_CREATE_FAILED: &str = "Failed to create scene.";
pub const SCENE_DELETE_FAILED: &str = "Failed to delete scene.";
pub const SCENE_NOT_FOUND: &str = "Scene not found.";
pub const WORKSPACE_FETCH_FAILED: &str = "Failed to load workspaces.";
pub const WORKSPACE_CREATE_FAILED: &str = "Failed to create workspace.";
pub const WORKSPACE_UPDATE_FAILED: &str = "Failed to update workspace.";
pub const WORKSPACE_DELETE_FAILED: &str = "Failed to delete workspace.";
pub const SHARE_LINK_GENERATED: &str = "Share link created!";
pub const SHARE_LINK_REVOKED: &str = "Share link revoked.";
pub const SHARE_LINK_FAILED: &str = "Failed to generate share link.";
pub const SHARE_REVOKE_FAILED: &str = "Failed to revoke share link.";
pub const SIGN_OUT_FAILED: &str = "Failed to sign out. Please try again.";
pub const PROFILE_UPDATE_FAILED: &str = "Failed to update profile.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
    pub duration: Duration,
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Toast>,
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(TOAST_CHANNEL_CAPACITY);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Toast> {
        self.tx.subscribe()
    }

    pub fn error(&self, message: &str) {
        self.push(ToastLevel::Error, message);
    }

    pub fn success(&self, message: &str) {
        self.push(ToastLevel::Success, message);
    }

    fn push(&self, level: ToastLevel, message: &str) {
        let _ = self.tx.send(Toast { level, message: message.to_string(), duration: TOAST_DURATION });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
