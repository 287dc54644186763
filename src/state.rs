//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` wires every store to one backend, one local storage and one
//! notifier. It is cheap to clone: stores are `Arc`-wrapped or hold `Arc`
//! internals, so every clone sees the same scenes, workspaces and session.

use std::sync::Arc;

use crate::config::{Config, Limits};
use crate::db::Backend;
use crate::notify::Notifier;
use crate::services::auth::{AuthStore, IdentityProvider};
use crate::services::local_scene::LocalSceneStore;
use crate::services::scene::SceneStore;
use crate::services::share::ShareLinks;
use crate::services::workspace::WorkspaceStore;
use crate::storage::LocalStorage;

#[derive(Clone)]
pub struct AppState {
    pub limits: Limits,
    pub notifier: Notifier,
    pub backend: Arc<dyn Backend>,
    pub local: Arc<LocalSceneStore>,
    pub scenes: SceneStore,
    pub shares: ShareLinks,
    pub workspaces: Arc<WorkspaceStore>,
    pub auth: Arc<AuthStore>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: &Config,
        backend: Arc<dyn Backend>,
        identity: Arc<dyn IdentityProvider>,
        storage: Arc<dyn LocalStorage>,
    ) -> Self {
        let limits = config.limits;
        let notifier = Notifier::new();
        let scenes = SceneStore::new(backend.clone(), notifier.clone(), limits.save_debounce);
        Self {
            limits,
            notifier: notifier.clone(),
            local: Arc::new(LocalSceneStore::open(storage)),
            shares: ShareLinks::new(scenes.clone(), config.share_origin.clone()),
            scenes,
            workspaces: Arc::new(WorkspaceStore::new(backend.clone(), notifier.clone(), limits.max_workspaces_free)),
            auth: Arc::new(AuthStore::new(identity, backend.clone(), notifier)),
            backend,
        }
    }

    /// Drop all signed-in state, e.g. after sign-out. The local scene stays.
    pub fn reset_session(&self) {
        self.scenes.reset();
        self.workspaces.reset();
    }
}
