//! Runtime configuration and quota constants.
//!
//! DESIGN
//! ======
//! Everything is read from environment variables with typed defaults, the
//! same `env_parse` pattern the persistence worker uses. Tier quotas and
//! widget geometry live in `Limits` so tests can shrink them without
//! touching the environment.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 1000;
pub const DEFAULT_CHANGE_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_MAX_WIDGETS_FREE: usize = 3;
pub const DEFAULT_MAX_WORKSPACES_FREE: usize = 1;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_LOCAL_STORAGE_DIR: &str = ".codeboard";
pub const DEFAULT_SHARE_ORIGIN: &str = "http://localhost:5173";

pub const WIDGET_DEFAULT_WIDTH: f64 = 400.0;
pub const WIDGET_DEFAULT_HEIGHT: f64 = 300.0;
pub const WIDGET_MIN_WIDTH: f64 = 250.0;
pub const WIDGET_MIN_HEIGHT: f64 = 150.0;
pub const WIDGET_DEFAULT_CODE: &str = "// Start coding here...\n";

pub const DEFAULT_SCENE_NAME: &str = "Untitled Scene";
pub const DEFAULT_LOCAL_SCENE_NAME: &str = "Untitled";
pub const IMPORTED_SCENE_NAME: &str = "Imported Scene";

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Tier quotas and debounce windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// Max widgets per scene on the free tier.
    pub max_widgets_free: usize,
    /// Max workspaces per owner on the free tier.
    pub max_workspaces_free: usize,
    /// Trailing debounce for canvas-data writes in the remote store.
    pub save_debounce: Duration,
    /// Trailing debounce for raw drawing change events in the whiteboard.
    pub change_debounce: Duration,
    pub min_widget_width: f64,
    pub min_widget_height: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_widgets_free: DEFAULT_MAX_WIDGETS_FREE,
            max_workspaces_free: DEFAULT_MAX_WORKSPACES_FREE,
            save_debounce: Duration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS),
            change_debounce: Duration::from_millis(DEFAULT_CHANGE_DEBOUNCE_MS),
            min_widget_width: WIDGET_MIN_WIDTH,
            min_widget_height: WIDGET_MIN_HEIGHT,
        }
    }
}

impl Limits {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_widgets_free: env_parse("MAX_WIDGETS_FREE", DEFAULT_MAX_WIDGETS_FREE),
            max_workspaces_free: env_parse("MAX_WORKSPACES_FREE", DEFAULT_MAX_WORKSPACES_FREE),
            save_debounce: Duration::from_millis(env_parse("SAVE_DEBOUNCE_MS", DEFAULT_SAVE_DEBOUNCE_MS)),
            change_debounce: Duration::from_millis(env_parse("CHANGE_DEBOUNCE_MS", DEFAULT_CHANGE_DEBOUNCE_MS)),
            ..Self::default()
        }
    }
}

/// Process-level configuration for the binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Directory holding durable local records.
    pub local_storage_dir: PathBuf,
    /// Origin prepended to share URLs, without a trailing slash.
    pub share_origin: String,
    pub limits: Limits,
}

impl Config {
    /// Build config from environment variables.
    ///
    /// - `DATABASE_URL`: Postgres connection string (optional; offline without it)
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `LOCAL_STORAGE_DIR`: directory for the anonymous scene record
    /// - `SHARE_ORIGIN`: origin for share links
    /// - `SAVE_DEBOUNCE_MS`, `CHANGE_DEBOUNCE_MS`, `MAX_WIDGETS_FREE`, `MAX_WORKSPACES_FREE`
    #[must_use]
    pub fn from_env() -> Self {
        let share_origin = std::env::var("SHARE_ORIGIN").unwrap_or_else(|_| DEFAULT_SHARE_ORIGIN.to_string());
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            local_storage_dir: std::env::var("LOCAL_STORAGE_DIR")
                .map_or_else(|_| PathBuf::from(DEFAULT_LOCAL_STORAGE_DIR), PathBuf::from),
            share_origin: share_origin.trim_end_matches('/').to_string(),
            limits: Limits::from_env(),
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
