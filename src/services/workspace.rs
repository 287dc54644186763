//! Workspace store: the owner's workspaces and the tier quota rule.
//!
//! The quota is checked twice. `can_create_workspace` lets the UI disable
//! the affordance using the tier the caller holds. The backend then applies
//! the free limit against the owner's stored tier, so neither a stale list
//! nor a claimed tier gets an extra workspace past it.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::Backend;
use crate::error::{AppError, ErrorCode};
use crate::model::{Tier, Workspace};
use crate::notify::{self, Notifier};

#[derive(Default)]
struct WorkspaceState {
    workspaces: Vec<Workspace>,
    current: Option<Uuid>,
    is_loading: bool,
    error: Option<String>,
}

pub struct WorkspaceStore {
    backend: Arc<dyn Backend>,
    notifier: Notifier,
    max_workspaces_free: usize,
    state: Mutex<WorkspaceState>,
}

fn validate_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name", "Workspace name cannot be empty"));
    }
    Ok(name)
}

impl WorkspaceStore {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, notifier: Notifier, max_workspaces_free: usize) -> Self {
        Self { backend, notifier, max_workspaces_free, state: Mutex::new(WorkspaceState::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, WorkspaceState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn fail(&self, toast: &str, e: &AppError) {
        self.lock().error = Some(e.to_string());
        self.notifier.error(toast);
    }

    #[must_use]
    pub fn workspaces(&self) -> Vec<Workspace> {
        self.lock().workspaces.clone()
    }

    #[must_use]
    pub fn current_workspace(&self) -> Option<Workspace> {
        let state = self.lock();
        let id = state.current?;
        state.workspaces.iter().find(|w| w.id == id).cloned()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lock().is_loading
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Free tier may own at most `max_workspaces_free`; premium is unlimited.
    #[must_use]
    pub fn can_create_workspace(&self, tier: Tier) -> bool {
        tier == Tier::Premium || self.lock().workspaces.len() < self.max_workspaces_free
    }

    /// Load the owner's workspaces, newest first. Selects the first one when
    /// nothing valid is current.
    pub async fn fetch_workspaces(&self, owner_id: Uuid) -> bool {
        {
            let mut state = self.lock();
            state.is_loading = true;
            state.error = None;
        }

        let result = self.backend.list_workspaces(owner_id).await;

        let mut state = self.lock();
        state.is_loading = false;
        match result {
            Ok(mut workspaces) => {
                workspaces.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                let current_valid = state
                    .current
                    .is_some_and(|id| workspaces.iter().any(|w| w.id == id));
                if !current_valid {
                    state.current = workspaces.first().map(|w| w.id);
                }
                debug!(%owner_id, count = workspaces.len(), "fetched workspaces");
                state.workspaces = workspaces;
                true
            }
            Err(e) => {
                error!(%owner_id, error = %e, "fetch workspaces failed");
                drop(state);
                self.fail(notify::WORKSPACE_FETCH_FAILED, &e);
                false
            }
        }
    }

    /// Create a workspace and make it current.
    pub async fn create_workspace(&self, owner_id: Uuid, tier: Tier, name: &str) -> Option<Workspace> {
        self.lock().error = None;

        let name = match validate_name(name) {
            Ok(name) => name,
            Err(e) => {
                self.lock().error = Some(e.to_string());
                return None;
            }
        };
        if !self.can_create_workspace(tier) {
            let e = AppError::QuotaExceeded { resource: "workspace", limit: self.max_workspaces_free };
            warn!(%owner_id, code = e.error_code(), "workspace quota reached");
            self.lock().error = Some(e.to_string());
            return None;
        }

        self.lock().is_loading = true;
        let result = self.backend.insert_workspace(owner_id, name, self.max_workspaces_free).await;
        self.lock().is_loading = false;

        match result {
            Ok(ws) => {
                info!(workspace_id = %ws.id, %owner_id, "created workspace");
                let mut state = self.lock();
                state.workspaces.insert(0, ws.clone());
                state.current = Some(ws.id);
                Some(ws)
            }
            Err(e @ AppError::QuotaExceeded { .. }) => {
                warn!(%owner_id, error = %e, "backend refused workspace over quota");
                self.lock().error = Some(e.to_string());
                None
            }
            Err(e) => {
                error!(%owner_id, error = %e, "create workspace failed");
                self.fail(notify::WORKSPACE_CREATE_FAILED, &e);
                None
            }
        }
    }

    /// Rename a workspace.
    pub async fn update_workspace(&self, id: Uuid, name: &str) -> bool {
        self.lock().error = None;
        let name = match validate_name(name) {
            Ok(name) => name,
            Err(e) => {
                self.lock().error = Some(e.to_string());
                return false;
            }
        };

        match self.backend.update_workspace(id, name).await {
            Ok(()) => {
                let mut state = self.lock();
                if let Some(ws) = state.workspaces.iter_mut().find(|w| w.id == id) {
                    ws.name = name.to_string();
                    ws.updated_at = crate::model::now_ms();
                }
                true
            }
            Err(e) => {
                error!(workspace_id = %id, error = %e, "update workspace failed");
                self.fail(notify::WORKSPACE_UPDATE_FAILED, &e);
                false
            }
        }
    }

    /// Delete a workspace and its scenes. If it was current, the first
    /// remaining workspace becomes current.
    pub async fn delete_workspace(&self, id: Uuid) -> bool {
        self.lock().error = None;
        match self.backend.delete_workspace(id).await {
            Ok(()) => {
                info!(workspace_id = %id, "deleted workspace");
                let mut state = self.lock();
                state.workspaces.retain(|w| w.id != id);
                if state.current == Some(id) {
                    state.current = state.workspaces.first().map(|w| w.id);
                }
                true
            }
            Err(e) => {
                error!(workspace_id = %id, error = %e, "delete workspace failed");
                self.fail(notify::WORKSPACE_DELETE_FAILED, &e);
                false
            }
        }
    }

    /// Select a fetched workspace. Unknown ids are ignored.
    pub fn set_current_workspace(&self, id: Uuid) {
        let mut state = self.lock();
        if state.workspaces.iter().any(|w| w.id == id) {
            state.current = Some(id);
        }
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub fn reset(&self) {
        *self.lock() = WorkspaceState::default();
    }
}

#[cfg(test)]
#[path = "workspace_test.rs"]
mod tests;
