// ABOUTME: Shared API response types and error handling
// ABOUTME: Every body is {success, data, error}; lifecycle errors map to HTTP status codes

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json as ResponseJson, Response},
};
use dockyard_lifecycle::LifecycleError;
use serde::Serialize;
use tracing::error;

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Successful response without a payload
    pub fn empty() -> Self {
        ApiResponse {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// JSON error response with the given status
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, ResponseJson(ApiResponse::<()>::error(message.into()))).into_response()
}

/// Lifecycle error carried to the HTTP boundary
#[derive(Debug)]
pub struct ApiError(pub LifecycleError);

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &LifecycleError) -> StatusCode {
    match err {
        LifecycleError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        LifecycleError::ChallengeNotEligible(_)
        | LifecycleError::NoActiveContainer
        | LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::ChallengeMismatch { .. } => StatusCode::CONFLICT,
        LifecycleError::RenewalLimitExceeded { .. } => StatusCode::FORBIDDEN,
        LifecycleError::CapacityExceeded { .. } | LifecycleError::AllocationFailure { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        LifecycleError::RuntimeFailure(_) => StatusCode::BAD_GATEWAY,
        LifecycleError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        LifecycleError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);

        let message = match &self.0 {
            LifecycleError::Storage(e) => {
                error!("Storage failure while handling request: {}", e);
                "Database error".to_string()
            }
            other => other.to_string(),
        };

        let mut response = error_response(status, message);
        if let LifecycleError::RateLimited { retry_after_secs } = self.0 {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type ApiResult<T> = Result<ResponseJson<ApiResponse<T>>, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_lifecycle::RuntimeError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&LifecycleError::RateLimited { retry_after_secs: 5 }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&LifecycleError::ChallengeMismatch {
                requested: 1,
                active: 2
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&LifecycleError::RuntimeFailure(RuntimeError::Unreachable(
                "down".to_string()
            ))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&LifecycleError::CapacityExceeded { max: 3 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError(LifecycleError::RateLimited {
            retry_after_secs: 42,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
