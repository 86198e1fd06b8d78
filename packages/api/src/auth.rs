// ABOUTME: Caller identity for API requests, supplied by the upstream authenticating proxy
// ABOUTME: X-User-Id identifies the user; X-User-Role: admin unlocks administrative routes

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::Response,
};

use crate::response::error_response;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const ADMIN_ROLE: &str = "admin";

/// Current authenticated user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub is_admin: bool,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Authentication required"))?;

        let is_admin = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|role| role.trim().eq_ignore_ascii_case(ADMIN_ROLE));

        Ok(Self {
            id: id.to_string(),
            is_admin,
        })
    }
}

/// A user carrying the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(error_response(
                StatusCode::FORBIDDEN,
                "Administrator role required",
            ));
        }
        Ok(AdminUser(user))
    }
}
