// ABOUTME: HTTP request handlers for administrators
// ABOUTME: Settings, live container listing, forced removal and renewal, orphan reconciliation

use axum::{
    extract::State,
    Json,
};
use dockyard_lifecycle::{ContainerManager, ContainerPage, OrphanReport, PageRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::auth::AdminUser;
use crate::container_handlers::ConnectionDto;
use crate::query::ApiQuery;
use crate::response::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RenewQuery {
    pub user_id: String,
    pub challenge_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct OrphanQuery {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct RemovedDto {
    pub removed: bool,
}

/// GET /api/admin/settings
pub async fn list_settings(
    State(manager): State<Arc<ContainerManager>>,
    _admin: AdminUser,
) -> ApiResult<BTreeMap<String, String>> {
    Ok(Json(ApiResponse::success(manager.list_configs().await?)))
}

/// Upsert settings, then return the full set
///
/// PATCH /api/admin/settings
pub async fn update_settings(
    State(manager): State<Arc<ContainerManager>>,
    AdminUser(admin): AdminUser,
    Json(configs): Json<BTreeMap<String, String>>,
) -> ApiResult<BTreeMap<String, String>> {
    info!("Admin {} updating {} setting(s)", admin.id, configs.len());
    manager.save_configs(configs).await?;
    Ok(Json(ApiResponse::success(manager.list_configs().await?)))
}

/// GET /api/admin/containers?page=
pub async fn list_containers(
    State(manager): State<Arc<ContainerManager>>,
    _admin: AdminUser,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<ContainerPage> {
    Ok(Json(ApiResponse::success(
        manager.list_live_containers(page).await?,
    )))
}

/// DELETE /api/admin/containers?user_id=
pub async fn force_remove(
    State(manager): State<Arc<ContainerManager>>,
    AdminUser(admin): AdminUser,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> ApiResult<RemovedDto> {
    info!("Admin {} removing container of {}", admin.id, query.user_id);
    let removed = manager.force_remove(&query.user_id).await?;
    Ok(Json(ApiResponse::success(RemovedDto { removed })))
}

/// PATCH /api/admin/containers?user_id=&challenge_id=
pub async fn force_renew(
    State(manager): State<Arc<ContainerManager>>,
    AdminUser(admin): AdminUser,
    ApiQuery(query): ApiQuery<RenewQuery>,
) -> ApiResult<ConnectionDto> {
    info!("Admin {} renewing container of {}", admin.id, query.user_id);
    let info = manager
        .force_renew(&query.user_id, query.challenge_id)
        .await?;
    Ok(Json(ApiResponse::success(info.into())))
}

/// POST /api/admin/orphans?dry_run=
pub async fn cleanup_orphans(
    State(manager): State<Arc<ContainerManager>>,
    AdminUser(admin): AdminUser,
    ApiQuery(query): ApiQuery<OrphanQuery>,
) -> ApiResult<OrphanReport> {
    info!(
        "Admin {} reconciling orphaned workloads (dry_run={})",
        admin.id, query.dry_run
    );
    let report = manager.cleanup_orphaned_workloads(query.dry_run).await?;
    Ok(Json(ApiResponse::success(report)))
}
