// ABOUTME: HTTP request handlers for a user's own challenge container
// ABOUTME: Create, status, renew and remove, keyed by the caller's identity

use axum::{
    extract::State,
    Json,
};
use dockyard_lifecycle::{ConnectionInfo, ContainerManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::auth::CurrentUser;
use crate::query::ApiQuery;
use crate::response::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct ChallengeQuery {
    pub challenge_id: i64,
}

/// Connection details as presented to players
#[derive(Debug, Serialize)]
pub struct ConnectionDto {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub host: String,
    pub port: u16,
    pub remaining_time: i64,
}

impl From<ConnectionInfo> for ConnectionDto {
    fn from(info: ConnectionInfo) -> Self {
        Self {
            kind: "redirect",
            host: info.host,
            port: info.port,
            remaining_time: info.remaining_seconds,
        }
    }
}

/// Start a container for a challenge, replacing any the caller already owns
///
/// POST /api/container?challenge_id=
pub async fn create_container(
    State(manager): State<Arc<ContainerManager>>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<ChallengeQuery>,
) -> ApiResult<ConnectionDto> {
    info!(
        "User {} requested a container for challenge {}",
        user.id, query.challenge_id
    );
    let info = manager.request_create(&user.id, query.challenge_id).await?;
    Ok(Json(ApiResponse::success(info.into())))
}

/// Report the caller's container for a challenge, or null when there is none
///
/// GET /api/container?challenge_id=
pub async fn container_status(
    State(manager): State<Arc<ContainerManager>>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<ChallengeQuery>,
) -> ApiResult<Option<ConnectionDto>> {
    let info = manager.request_status(&user.id, query.challenge_id).await?;
    Ok(Json(ApiResponse::success(info.map(Into::into))))
}

/// Extend the caller's container by one lifetime window
///
/// PATCH /api/container?challenge_id=
pub async fn renew_container(
    State(manager): State<Arc<ContainerManager>>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<ChallengeQuery>,
) -> ApiResult<ConnectionDto> {
    let info = manager.request_renew(&user.id, query.challenge_id).await?;
    Ok(Json(ApiResponse::success(info.into())))
}

/// Tear down the caller's container. Succeeds when there is nothing to remove.
///
/// DELETE /api/container
pub async fn remove_container(
    State(manager): State<Arc<ContainerManager>>,
    user: CurrentUser,
) -> ApiResult<()> {
    manager.request_remove(&user.id).await?;
    Ok(Json(ApiResponse::empty()))
}
