// ABOUTME: Query-string extractor that reports malformed parameters in the API envelope
// ABOUTME: Wraps axum's Query so a missing or unparsable field answers 400 with {success:false}

use axum::{
    extract::{FromRequestParts, Query},
    http::{request::Parts, StatusCode},
    response::Response,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::response::error_response;

/// Deserialized query parameters
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => {
                let message = rejection.body_text();
                debug!("Rejected query for {}: {}", parts.uri.path(), message);
                Err(error_response(StatusCode::BAD_REQUEST, message))
            }
        }
    }
}
