pub mod auth;
pub mod local_scene;
pub mod onboarding;
pub mod scene;
pub mod share;
pub mod whiteboard;
pub mod workspace;
