//! Error taxonomy shared by every store.
//!
//! DESIGN
//! ======
//! One `AppError` enum carries a machine-readable code and a human message.
//! Stores that talk to a backend never hand these to their callers for
//! network failures; they record the message on their own `error` field and
//! raise a toast instead. The enum still crosses the `Backend` seam so the
//! stores can tell "not found" apart from "unreachable".

use uuid::Uuid;

/// Grepable error codes, mirrored into logs and toasts.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Identity operations: sign-up, sign-in, session restore.
    #[error("{message}")]
    Auth { code: &'static str, message: String },

    /// Backend connectivity or query failure.
    #[error("network error: {0}")]
    Network(String),

    /// User-input shape, e.g. an empty workspace name.
    #[error("{message}")]
    Validation { field: Option<&'static str>, message: String },

    /// Durable local storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A local-scene mutation ran before any scene was created.
    #[error("no local scene exists")]
    NoScene,

    #[error("{resource} limit reached (max {limit})")]
    QuotaExceeded { resource: &'static str, limit: usize },

    #[error("scene is read-only")]
    ReadOnly,

    /// A step of the post-sign-up flow could not finish.
    #[error("onboarding {step} failed: {message}")]
    Onboarding { step: &'static str, message: String },
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { field: Some(field), message: message.into() }
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl ErrorCode for AppError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Auth { code, .. } => code,
            Self::Network(_) => "E_NETWORK",
            Self::Validation { .. } => "E_VALIDATION",
            Self::Storage(_) => "E_STORAGE",
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::NoScene => "E_NO_SCENE",
            Self::QuotaExceeded { .. } => "E_QUOTA_EXCEEDED",
            Self::ReadOnly => "E_READ_ONLY",
            Self::Onboarding { .. } => "E_ONBOARDING",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
