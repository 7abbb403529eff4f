//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use engine::EngineError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Missing or invalid webhook signature.
    Unauthorized(String),
    /// Engine error.
    Engine(EngineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, retryable) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, false),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, false),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, false),
            ApiError::Engine(err) => engine_error_to_response(err),
        };

        let body = if retryable {
            serde_json::json!({ "error": message, "retryable": true })
        } else {
            serde_json::json!({ "error": message })
        };
        (status, axum::Json(body)).into_response()
    }
}

fn engine_error_to_response(err: EngineError) -> (StatusCode, String, bool) {
    let retryable = err.is_retryable();
    let status = match &err {
        EngineError::Validation(_) | EngineError::Domain(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InsufficientStock(_)
        | EngineError::ConcurrencyConflict(_)
        | EngineError::DeductionIntegrity { .. } => StatusCode::CONFLICT,
        EngineError::Payment(_) => StatusCode::BAD_GATEWAY,
        EngineError::Store(_) | EngineError::IndexBuild(_) if retryable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => {
            tracing::error!(error = %err, "internal server error");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
                false,
            );
        }
    };
    (status, err.to_string(), retryable)
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: EngineError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_engine_error_status_codes() {
        assert_eq!(
            status_of(EngineError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(EngineError::NotFound("order".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(EngineError::InsufficientStock(vec!["Iro".into()])),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::ConcurrencyConflict("busy".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::DeductionIntegrity {
                order_number: "ORD-20260101-ABCDEF".into(),
                reason: "held 0".into(),
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::Payment("down".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(EngineError::Notification("smtp".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_outage_is_retryable() {
        let err = EngineError::Store(store::StoreError::Unavailable("pool closed".into()));
        assert_eq!(status_of(err), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_signature_failure_is_unauthorized() {
        let response = ApiError::Unauthorized("bad signature".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
