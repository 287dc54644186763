//! Session identity and the signed-in user's profile.
//!
//! SYSTEM CONTEXT
//! ==============
//! Account mechanics (credentials, sessions) belong to an external identity
//! service reached through `IdentityProvider`. This store only keeps who is
//! signed in and their `Profile`, which drives quota checks and onboarding.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::Backend;
use crate::error::AppError;
use crate::ids;
use crate::model::{Profile, ProfileUpdate, Tier};
use crate::notify::{self, Notifier};

pub const MIN_PASSWORD_LEN: usize = 6;
const SALT_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
}

/// Lowercase and trim an email; `None` unless it looks like `local@domain`.
#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return None;
    }
    Some(normalized)
}

fn validate_credentials(email: &str, password: &str) -> Result<String, AppError> {
    let email = normalize_email(email).ok_or_else(|| AppError::validation("email", "Invalid email address"))?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(email)
}

// =============================================================================
// IDENTITY PROVIDER
// =============================================================================

/// External identity service. Enables mocking in tests.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AppError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AppError>;

    async fn sign_out(&self) -> Result<(), AppError>;

    /// The persisted session, if any.
    async fn session(&self) -> Result<Option<User>, AppError>;
}

struct Account {
    id: Uuid,
    salt: String,
    password_hash: String,
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    ids::bytes_to_hex(&hasher.finalize())
}

#[derive(Default)]
struct IdentityState {
    accounts: HashMap<String, Account>,
    session: Option<User>,
    offline: bool,
}

/// In-process identity service for tests and offline runs.
#[derive(Clone, Default)]
pub struct MemoryIdentity {
    state: Arc<Mutex<IdentityState>>,
}

impl MemoryIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IdentityState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    fn check_online(state: &IdentityState) -> Result<(), AppError> {
        if state.offline {
            return Err(AppError::Network("identity service unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AppError> {
        let mut state = self.lock();
        Self::check_online(&state)?;
        if state.accounts.contains_key(email) {
            return Err(AppError::Auth { code: "E_AUTH_EXISTS", message: "User already registered".into() });
        }
        let salt = ids::short_id(SALT_LEN);
        let account = Account { id: Uuid::new_v4(), password_hash: hash_password(&salt, password), salt };
        let user = User { id: account.id, email: email.to_string() };
        state.accounts.insert(email.to_string(), account);
        state.session = Some(user.clone());
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AppError> {
        let mut state = self.lock();
        Self::check_online(&state)?;
        let user = state
            .accounts
            .get(email)
            .filter(|a| hash_password(&a.salt, password) == a.password_hash)
            .map(|a| User { id: a.id, email: email.to_string() })
            .ok_or_else(|| AppError::Auth { code: "E_AUTH_INVALID", message: "Invalid login credentials".into() })?;
        state.session = Some(user.clone());
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        let mut state = self.lock();
        Self::check_online(&state)?;
        state.session = None;
        Ok(())
    }

    async fn session(&self) -> Result<Option<User>, AppError> {
        let state = self.lock();
        Self::check_online(&state)?;
        Ok(state.session.clone())
    }
}

// =============================================================================
// AUTH STORE
// =============================================================================

#[derive(Default)]
struct AuthState {
    user: Option<User>,
    profile: Option<Profile>,
    loading: bool,
    error: Option<String>,
}

pub struct AuthStore {
    identity: Arc<dyn IdentityProvider>,
    backend: Arc<dyn Backend>,
    notifier: Notifier,
    state: Mutex<AuthState>,
}

impl AuthStore {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>, backend: Arc<dyn Backend>, notifier: Notifier) -> Self {
        Self { identity, backend, notifier, state: Mutex::new(AuthState::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_loading(&self, loading: bool) {
        let mut state = self.lock();
        state.loading = loading;
        if loading {
            state.error = None;
        }
    }

    fn record(&self, e: &AppError) {
        self.lock().error = Some(e.to_string());
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    #[must_use]
    pub fn profile(&self) -> Option<Profile> {
        self.lock().profile.clone()
    }

    /// Tier of the signed-in user; anonymous sessions are free.
    #[must_use]
    pub fn tier(&self) -> Tier {
        self.lock().profile.as_ref().map_or(Tier::Free, |p| p.tier)
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    /// Register and sign in. A free-tier profile is created for the user.
    ///
    /// # Errors
    ///
    /// `AppError::Validation` for a malformed email or short password,
    /// otherwise whatever the identity service reports.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = validate_credentials(email, password).inspect_err(|e| self.record(e))?;
        self.set_loading(true);

        let user = match self.identity.sign_up(&email, password).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "sign up failed");
                self.record(&e);
                self.set_loading(false);
                return Err(e);
            }
        };
        info!(user_id = %user.id, "signed up");

        let profile = match self.backend.create_profile(user.id).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                error!(user_id = %user.id, error = %e, "profile creation failed");
                self.record(&e);
                None
            }
        };

        let mut state = self.lock();
        state.user = Some(user.clone());
        state.profile = profile;
        state.loading = false;
        Ok(user)
    }

    /// Sign in and load the profile.
    ///
    /// # Errors
    ///
    /// `AppError::Auth` for bad credentials, `AppError::Network` when the
    /// identity service is unreachable.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = normalize_email(email)
            .ok_or_else(|| AppError::validation("email", "Invalid email address"))
            .inspect_err(|e| self.record(e))?;
        self.set_loading(true);

        let user = match self.identity.sign_in(&email, password).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "sign in failed");
                self.record(&e);
                self.set_loading(false);
                return Err(e);
            }
        };
        info!(user_id = %user.id, "signed in");
        self.lock().user = Some(user.clone());

        self.fetch_profile().await;
        self.set_loading(false);
        Ok(user)
    }

    /// Sign out. User and profile are cleared only if the service agrees.
    pub async fn sign_out(&self) -> bool {
        match self.identity.sign_out().await {
            Ok(()) => {
                let mut state = self.lock();
                if let Some(user) = state.user.take() {
                    info!(user_id = %user.id, "signed out");
                }
                state.profile = None;
                true
            }
            Err(e) => {
                error!(error = %e, "sign out failed");
                self.record(&e);
                self.notifier.error(notify::SIGN_OUT_FAILED);
                false
            }
        }
    }

    /// Restore a persisted session and its profile.
    pub async fn initialize(&self) {
        self.set_loading(true);
        match self.identity.session().await {
            Ok(Some(user)) => {
                info!(user_id = %user.id, "session restored");
                self.lock().user = Some(user);
                self.fetch_profile().await;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "session restore failed");
                self.record(&e);
            }
        }
        self.set_loading(false);
    }

    /// Reload the profile of the signed-in user. A missing profile row is
    /// `None`, not an error.
    pub async fn fetch_profile(&self) -> Option<Profile> {
        let user_id = self.lock().user.as_ref()?.id;
        match self.backend.get_profile(user_id).await {
            Ok(profile) => {
                self.lock().profile.clone_from(&profile);
                profile
            }
            Err(e) => {
                error!(%user_id, error = %e, "fetch profile failed");
                self.record(&e);
                None
            }
        }
    }

    /// Apply an explicit profile change.
    pub async fn update_profile(&self, update: ProfileUpdate) -> bool {
        let Some(user_id) = self.lock().user.as_ref().map(|u| u.id) else {
            warn!("update_profile without a signed-in user");
            return false;
        };
        match self.backend.update_profile(user_id, &update).await {
            Ok(()) => {
                if let Some(profile) = self.lock().profile.as_mut() {
                    update.apply(profile);
                }
                true
            }
            Err(e) => {
                error!(%user_id, error = %e, "update profile failed");
                self.record(&e);
                self.notifier.error(notify::PROFILE_UPDATE_FAILED);
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
