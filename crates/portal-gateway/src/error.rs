use axum::http::StatusCode;
use portal_core::{LifecycleError, StoreError};
use tracing::error;

pub type ApiError = (StatusCode, String);

pub fn invalid_request(err: anyhow::Error) -> ApiError {
    (StatusCode::BAD_REQUEST, err.to_string())
}

pub fn internal_error<E: std::fmt::Display>(err: E) -> ApiError {
    error!("request failed: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal error".to_string(),
    )
}

pub fn not_found(entity: &str) -> ApiError {
    (StatusCode::NOT_FOUND, format!("{entity} not found"))
}

pub fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        StoreError::Conflict(_) | StoreError::Duplicate(_) => (StatusCode::CONFLICT, err.to_string()),
        StoreError::Backend(err) => internal_error(err),
    }
}

pub fn lifecycle_error(err: LifecycleError) -> ApiError {
    match err {
        LifecycleError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        LifecycleError::IllegalTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_statuses() {
        assert_eq!(store_error(StoreError::NotFound("bill")).0, StatusCode::NOT_FOUND);
        assert_eq!(
            store_error(StoreError::Conflict("agreement")).0,
            StatusCode::CONFLICT
        );
        let backend = store_error(StoreError::Backend(anyhow::anyhow!("connection reset")));
        assert_eq!(backend.0, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(backend.1, "internal error");

        assert_eq!(
            lifecycle_error(LifecycleError::validation("reason is required")).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            lifecycle_error(LifecycleError::illegal("sign", "rejected")).0,
            StatusCode::CONFLICT
        );
    }
}
