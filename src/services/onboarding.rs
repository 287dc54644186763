//! First-run flow after sign-up: workspace, then local import, then done.
//!
//! DESIGN
//! ======
//! The anonymous local scene is migrated one way into a new remote scene.
//! The local copy is cleared only after the remote create has succeeded, so
//! any failure along the way leaves the user's work where it was.
//!
//! ERROR HANDLING
//! ==============
//! The stores report failures as `None`/`false` plus their own `error`
//! field. This flow lifts those into `AppError::Onboarding` naming the step,
//! carrying the store's message when one was recorded.

use std::sync::{Mutex, MutexGuard};

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::IMPORTED_SCENE_NAME;
use crate::error::AppError;
use crate::model::{ProfileUpdate, Scene, Workspace};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingStep {
    /// No workspace yet.
    Workspace,
    /// Workspace created; the user picks import or start fresh.
    Import { workspace_id: Uuid },
    Done { workspace_id: Uuid },
}

fn step_failed(step: &'static str, recorded: Option<String>) -> AppError {
    AppError::Onboarding { step, message: recorded.unwrap_or_else(|| "unknown error".to_string()) }
}

pub struct Onboarding {
    app: AppState,
    step: Mutex<OnboardingStep>,
}

impl Onboarding {
    #[must_use]
    pub fn new(app: &AppState) -> Self {
        Self { app: app.clone(), step: Mutex::new(OnboardingStep::Workspace) }
    }

    fn lock(&self) -> MutexGuard<'_, OnboardingStep> {
        self.step
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn step(&self) -> OnboardingStep {
        *self.lock()
    }

    /// Signed in with a profile that has not finished onboarding.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.app.auth.profile().is_some_and(|p| !p.onboarding_complete)
    }

    /// Whether the local scene has anything worth importing.
    #[must_use]
    pub fn has_local_data(&self) -> bool {
        self.app.local.scene().is_some_and(|s| s.has_content())
    }

    fn import_target(&self, step: &'static str) -> Result<Uuid, AppError> {
        match *self.lock() {
            OnboardingStep::Import { workspace_id } => Ok(workspace_id),
            OnboardingStep::Workspace => Err(AppError::Onboarding { step, message: "no workspace created yet".into() }),
            OnboardingStep::Done { .. } => Err(AppError::Onboarding { step, message: "onboarding already complete".into() }),
        }
    }

    /// Create the user's first workspace. Without local data there is
    /// nothing to choose, so an empty scene is created and onboarding
    /// completes straight away.
    ///
    /// # Errors
    ///
    /// `AppError::Auth` when nobody is signed in, `AppError::Validation` for
    /// a blank name, `AppError::Onboarding` when a store refuses.
    pub async fn create_workspace(&self, name: &str) -> Result<OnboardingStep, AppError> {
        let user = self
            .app
            .auth
            .user()
            .ok_or_else(|| AppError::Auth { code: "E_AUTH_REQUIRED", message: "Sign in to continue".into() })?;
        if name.trim().is_empty() {
            return Err(AppError::validation("name", "Please enter a workspace name"));
        }

        let workspace: Workspace = self
            .app
            .workspaces
            .create_workspace(user.id, self.app.auth.tier(), name)
            .await
            .ok_or_else(|| step_failed("workspace", self.app.workspaces.error()))?;
        info!(workspace_id = %workspace.id, user_id = %user.id, "onboarding workspace created");

        if self.has_local_data() {
            let next = OnboardingStep::Import { workspace_id: workspace.id };
            *self.lock() = next;
            return Ok(next);
        }

        self.app
            .scenes
            .create_scene(workspace.id, None, None)
            .await
            .ok_or_else(|| step_failed("scene", self.app.scenes.error()))?;
        self.complete(workspace.id).await?;
        Ok(self.step())
    }

    /// Move the local scene into a new remote scene, then clear it locally.
    /// An empty local scene degrades to [`Onboarding::start_fresh`].
    ///
    /// # Errors
    ///
    /// `AppError::Onboarding` when called out of order or when the remote
    /// create fails. The local scene is untouched in that case.
    pub async fn import_local(&self) -> Result<Scene, AppError> {
        let workspace_id = self.import_target("import")?;
        let local = self.app.local.scene().filter(|s| s.has_content());
        let (Some(local), Some(snapshot)) = (local, self.app.local.migration_snapshot()) else {
            return self.start_fresh().await;
        };

        let name = if local.name.trim().is_empty() { IMPORTED_SCENE_NAME } else { local.name.as_str() };
        let Some(scene) = self
            .app
            .scenes
            .create_scene(workspace_id, Some(name), Some(snapshot))
            .await
        else {
            warn!(local_scene_id = %local.id, "import failed; local scene kept");
            return Err(step_failed("import", self.app.scenes.error()));
        };

        info!(local_scene_id = %local.id, scene_id = %scene.id, widgets = scene.widgets.len(), "imported local scene");
        self.app.local.clear();
        self.complete(workspace_id).await?;
        Ok(scene)
    }

    /// Discard the local scene in favor of an empty remote one.
    ///
    /// # Errors
    ///
    /// Same as [`Onboarding::import_local`].
    pub async fn start_fresh(&self) -> Result<Scene, AppError> {
        let workspace_id = self.import_target("start_fresh")?;
        let scene = self
            .app
            .scenes
            .create_scene(workspace_id, None, None)
            .await
            .ok_or_else(|| step_failed("start_fresh", self.app.scenes.error()))?;
        self.app.local.clear();
        self.complete(workspace_id).await?;
        Ok(scene)
    }

    /// Mark the profile onboarded with `workspace_id` as its current workspace.
    ///
    /// # Errors
    ///
    /// `AppError::Onboarding` when the profile update fails.
    pub async fn complete(&self, workspace_id: Uuid) -> Result<(), AppError> {
        let update = ProfileUpdate { current_workspace_id: Some(Some(workspace_id)), onboarding_complete: Some(true) };
        if !self.app.auth.update_profile(update).await {
            return Err(step_failed("complete", self.app.auth.error()));
        }
        *self.lock() = OnboardingStep::Done { workspace_id };
        info!(%workspace_id, "onboarding complete");
        Ok(())
    }
}

#[cfg(test)]
#[path = "onboarding_test.rs"]
mod tests;
