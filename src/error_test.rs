use super::*;

#[test]
fn error_code_network_is_retryable() {
    let err = AppError::Network("connection refused".into());
    assert_eq!(err.error_code(), "E_NETWORK");
    assert!(err.retryable());
}

#[test]
fn error_code_validation_not_retryable() {
    let err = AppError::validation("name", "Please enter a workspace name");
    assert_eq!(err.error_code(), "E_VALIDATION");
    assert!(!err.retryable());
    assert_eq!(err.to_string(), "Please enter a workspace name");
}

#[test]
fn error_code_auth_uses_carried_code() {
    let err = AppError::Auth { code: "E_AUTH_INVALID_CREDENTIALS", message: "Invalid login credentials".into() };
    assert_eq!(err.error_code(), "E_AUTH_INVALID_CREDENTIALS");
}

#[test]
fn not_found_display_names_entity() {
    let id = Uuid::nil();
    let err = AppError::not_found("scene", id);
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), format!("scene not found: {id}"));
    assert_eq!(err.error_code(), "E_NOT_FOUND");
}

#[test]
fn quota_exceeded_display() {
    let err = AppError::QuotaExceeded { resource: "workspace", limit: 1 };
    assert_eq!(err.to_string(), "workspace limit reached (max 1)");
    assert_eq!(err.error_code(), "E_QUOTA_EXCEEDED");
}

#[test]
fn io_error_maps_to_storage() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs");
    let err: AppError = io.into();
    assert_eq!(err.error_code(), "E_STORAGE");
}

#[test]
fn sqlx_error_maps_to_network() {
    let err: AppError = sqlx::Error::PoolTimedOut.into();
    assert_eq!(err.error_code(), "E_NETWORK");
}
