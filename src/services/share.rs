//! Share links: mint, validate and revoke per-scene capability tokens.
//!
//! DESIGN
//! ======
//! A scene is either unshared `(None, none)` or shared `(token, view|edit)`.
//! The token is the capability; there is no grant table. Sharing again
//! always mints a fresh token, and revoking writes `(None, none)`.
//!
//! Validation always reads the scene from the backend, never the cached
//! list, so a revoke takes effect on the very next check. Every failure
//! (network, missing scene, wrong token, sharing disabled) collapses into
//! the same `Denied` so probers cannot learn whether a scene exists.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::ScenePatch;
use crate::error::AppError;
use crate::ids;
use crate::model::{Scene, SharePermission};
use crate::notify;
use crate::services::scene::SceneStore;

/// Outcome of checking a share token.
#[derive(Debug, Clone, PartialEq)]
pub enum ShareValidation {
    Granted { permission: SharePermission, scene: Scene },
    Denied,
}

impl ShareValidation {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }

    #[must_use]
    pub fn permission(&self) -> Option<SharePermission> {
        match self {
            Self::Granted { permission, .. } => Some(*permission),
            Self::Denied => None,
        }
    }

    #[must_use]
    pub fn into_scene(self) -> Option<Scene> {
        match self {
            Self::Granted { scene, .. } => Some(scene),
            Self::Denied => None,
        }
    }
}

/// Build `{origin}/scene/{scene_id}/shared/{token}`.
#[must_use]
pub fn share_url(origin: &str, scene_id: Uuid, token: &str) -> String {
    format!("{}/scene/{scene_id}/shared/{token}", origin.trim_end_matches('/'))
}

/// Extract `(scene_id, token)` from a share path or full share URL.
#[must_use]
pub fn parse_share_path(path: &str) -> Option<(Uuid, String)> {
    let path = path
        .split_once("://")
        .map_or(path, |(_, rest)| rest.find('/').map_or("", |i| &rest[i..]));
    let path = path.split(['?', '#']).next().unwrap_or_default();

    let mut parts = path.trim_matches('/').split('/');
    let (Some("scene"), Some(id), Some("shared"), Some(token), None) =
        (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    if token.is_empty() {
        return None;
    }
    let id = Uuid::parse_str(id).ok()?;
    Some((id, token.to_string()))
}

#[derive(Clone)]
pub struct ShareLinks {
    scenes: SceneStore,
    origin: String,
}

impl ShareLinks {
    #[must_use]
    pub fn new(scenes: SceneStore, origin: impl Into<String>) -> Self {
        Self { scenes, origin: origin.into() }
    }

    /// Mint a fresh token for `scene_id` at `permission` and return the
    /// share URL. Any previous token stops working.
    pub async fn generate_share_link(&self, scene_id: Uuid, permission: SharePermission) -> Option<String> {
        if permission == SharePermission::None {
            let e = AppError::validation("permission", "share permission must be view or edit");
            warn!(%scene_id, "refused to share with permission none");
            self.scenes.record_error(notify::SHARE_LINK_FAILED, &e);
            return None;
        }

        let token = ids::share_token();
        let patch = ScenePatch::share(Some(token.clone()), permission);
        match self.scenes.backend().update_scene(scene_id, &patch).await {
            Ok(()) => {
                info!(%scene_id, permission = permission.as_str(), "share link generated");
                self.scenes.apply_share(scene_id, Some(token.clone()), permission);
                self.scenes.notifier().success(notify::SHARE_LINK_GENERATED);
                Some(share_url(&self.origin, scene_id, &token))
            }
            Err(e) => {
                warn!(%scene_id, error = %e, "share link generation failed");
                self.scenes.record_error(notify::SHARE_LINK_FAILED, &e);
                None
            }
        }
    }

    /// Disable sharing. Safe to call on an unshared scene.
    pub async fn revoke_share_link(&self, scene_id: Uuid) -> bool {
        let patch = ScenePatch::share(None, SharePermission::None);
        match self.scenes.backend().update_scene(scene_id, &patch).await {
            Ok(()) => {
                info!(%scene_id, "share link revoked");
                self.scenes.apply_share(scene_id, None, SharePermission::None);
                self.scenes.notifier().success(notify::SHARE_LINK_REVOKED);
                true
            }
            Err(e) => {
                warn!(%scene_id, error = %e, "share link revoke failed");
                self.scenes.record_error(notify::SHARE_REVOKE_FAILED, &e);
                false
            }
        }
    }

    /// Check `token` against the scene's current share state.
    pub async fn validate_share_token(&self, scene_id: Uuid, token: &str) -> ShareValidation {
        let scene = match self.scenes.backend().get_scene(scene_id).await {
            Ok(scene) => scene,
            Err(e) => {
                debug!(%scene_id, error = %e, "share validation denied: fetch failed");
                return ShareValidation::Denied;
            }
        };

        let matches = scene.share_token.as_deref() == Some(token);
        if !matches || scene.share_permission == SharePermission::None {
            debug!(%scene_id, "share validation denied");
            return ShareValidation::Denied;
        }
        ShareValidation::Granted { permission: scene.share_permission, scene }
    }
}

#[cfg(test)]
#[path = "share_test.rs"]
mod tests;
