//! Whiteboard with embedded code widgets: local-first anonymous scenes,
//! workspace-scoped remote scenes, share links and tier quotas.

pub mod config;
pub mod db;
pub mod debounce;
pub mod error;
pub mod ids;
pub mod model;
pub mod notify;
pub mod services;
pub mod state;
pub mod storage;
