// ABOUTME: HTTP API layer for Dockyard
// ABOUTME: Routes player and admin requests to the container lifecycle manager

use axum::{
    routing::{get, post},
    Json, Router,
};
use dockyard_lifecycle::ContainerManager;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod admin_handlers;
pub mod auth;
pub mod container_handlers;
pub mod query;
pub mod response;

pub use auth::{AdminUser, CurrentUser};
pub use query::ApiQuery;
pub use response::{ApiError, ApiResponse};

/// Liveness check
///
/// GET /api/health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Player-facing routes for the caller's own container
pub fn create_container_router() -> Router<Arc<ContainerManager>> {
    Router::new().route(
        "/api/container",
        post(container_handlers::create_container)
            .get(container_handlers::container_status)
            .patch(container_handlers::renew_container)
            .delete(container_handlers::remove_container),
    )
}

/// Administrative routes
pub fn create_admin_router() -> Router<Arc<ContainerManager>> {
    Router::new()
        .route(
            "/api/admin/settings",
            get(admin_handlers::list_settings).patch(admin_handlers::update_settings),
        )
        .route(
            "/api/admin/containers",
            get(admin_handlers::list_containers)
                .delete(admin_handlers::force_remove)
                .patch(admin_handlers::force_renew),
        )
        .route("/api/admin/orphans", post(admin_handlers::cleanup_orphans))
}

/// Full application router
pub fn create_router(manager: Arc<ContainerManager>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .merge(create_container_router())
        .merge(create_admin_router())
        .layer(TraceLayer::new_for_http())
        .with_state(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use dockyard_lifecycle::test_utils::{seed_challenge, setup_test_db, FakeRuntime};
    use dockyard_lifecycle::{ChallengeState, PortAllocator};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn setup_app(cooldown: Duration) -> (Router, Arc<FakeRuntime>) {
        let pool = setup_test_db().await;
        seed_challenge(&pool, 1, ChallengeState::Visible).await;
        seed_challenge(&pool, 2, ChallengeState::Hidden).await;

        let runtime = Arc::new(FakeRuntime::new());
        let manager = ContainerManager::builder(pool, runtime.clone())
            .cooldown(cooldown)
            .port_allocator(PortAllocator::new(
                40000..=40999,
                64,
                Duration::from_millis(100),
            ))
            .build();

        (create_router(Arc::new(manager)), runtime)
    }

    fn request(method: &str, uri: &str, user: Option<&str>, admin: bool) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("X-User-Id", user);
        }
        if admin {
            builder = builder.header("X-User-Role", "admin");
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = setup_app(Duration::ZERO).await;

        let (status, body) = send(&app, request("GET", "/api/health", None, false)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (app, runtime) = setup_app(Duration::ZERO).await;

        let (status, body) = send(
            &app,
            request("POST", "/api/container?challenge_id=1", None, false),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_challenge_id_is_bad_request() {
        let (app, runtime) = setup_app(Duration::ZERO).await;

        for uri in ["/api/container?challenge_id=abc", "/api/container"] {
            let (status, body) = send(&app, request("POST", uri, Some("alice"), false)).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["success"], false);
            assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
        }
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_admin_query_errors_use_envelope() {
        let (app, _) = setup_app(Duration::ZERO).await;

        let (status, body) = send(
            &app,
            request("DELETE", "/api/admin/containers", Some("root"), true),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = send(
            &app,
            request("GET", "/api/admin/containers?page=first", Some("root"), true),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_admin_far_page_is_empty() {
        let (app, _) = setup_app(Duration::ZERO).await;
        send(
            &app,
            request("POST", "/api/container?challenge_id=1", Some("alice"), false),
        )
        .await;

        let (status, body) = send(
            &app,
            request(
                "GET",
                &format!("/api/admin/containers?page={}", i64::MAX),
                Some("root"),
                true,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["containers"].as_array().unwrap().len(), 0);
        assert_eq!(body["data"]["meta"]["totalItems"], 1);
    }

    #[tokio::test]
    async fn test_create_then_status() {
        let (app, _) = setup_app(Duration::ZERO).await;

        let (status, body) = send(
            &app,
            request("POST", "/api/container?challenge_id=1", Some("alice"), false),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["type"], "redirect");
        assert_eq!(body["data"]["remaining_time"], 3600);
        let port = body["data"]["port"].as_u64().unwrap();
        assert!((40000..=40999).contains(&port));

        let (status, body) = send(
            &app,
            request("GET", "/api/container?challenge_id=1", Some("alice"), false),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["port"].as_u64(), Some(port));
    }

    #[tokio::test]
    async fn test_status_without_container_is_null() {
        let (app, _) = setup_app(Duration::ZERO).await;

        let (status, body) = send(
            &app,
            request("GET", "/api/container?challenge_id=1", Some("alice"), false),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], Value::Null);
    }

    #[tokio::test]
    async fn test_hidden_challenge_is_not_found() {
        let (app, _) = setup_app(Duration::ZERO).await;

        let (status, body) = send(
            &app,
            request("POST", "/api/container?challenge_id=2", Some("alice"), false),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_second_request_inside_cooldown_is_throttled() {
        let (app, _) = setup_app(Duration::from_secs(60)).await;

        let (status, _) = send(
            &app,
            request("POST", "/api/container?challenge_id=1", Some("alice"), false),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let response = app
            .clone()
            .oneshot(request("DELETE", "/api/container", Some("alice"), false))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn test_renew_without_container() {
        let (app, _) = setup_app(Duration::ZERO).await;

        let (status, _) = send(
            &app,
            request("PATCH", "/api/container?challenge_id=1", Some("alice"), false),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (app, runtime) = setup_app(Duration::ZERO).await;
        send(
            &app,
            request("POST", "/api/container?challenge_id=1", Some("alice"), false),
        )
        .await;

        for _ in 0..2 {
            let (status, body) =
                send(&app, request("DELETE", "/api/container", Some("alice"), false)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["success"], true);
        }
        assert!(runtime.workloads().is_empty());
    }

    #[tokio::test]
    async fn test_admin_routes_require_admin_role() {
        let (app, _) = setup_app(Duration::ZERO).await;

        let (status, _) = send(
            &app,
            request("GET", "/api/admin/settings", Some("alice"), false),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) =
            send(&app, request("GET", "/api/admin/settings", Some("root"), true)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["docker_timeout"], "3600");
    }

    #[tokio::test]
    async fn test_admin_updates_settings() {
        let (app, _) = setup_app(Duration::ZERO).await;

        let req = Request::builder()
            .method("PATCH")
            .uri("/api/admin/settings")
            .header("X-User-Id", "root")
            .header("X-User-Role", "admin")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"docker_max_renew_count":"9"}"#))
            .unwrap();
        let (status, body) = send(&app, req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["docker_max_renew_count"], "9");
    }

    #[tokio::test]
    async fn test_admin_rejects_invalid_settings() {
        let (app, _) = setup_app(Duration::ZERO).await;

        let req = Request::builder()
            .method("PATCH")
            .uri("/api/admin/settings")
            .header("X-User-Id", "root")
            .header("X-User-Role", "admin")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"docker_timeout":"soon"}"#))
            .unwrap();
        let (status, body) = send(&app, req).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_admin_lists_and_removes_containers() {
        let (app, runtime) = setup_app(Duration::ZERO).await;
        for user in ["alice", "bob"] {
            send(
                &app,
                request("POST", "/api/container?challenge_id=1", Some(user), false),
            )
            .await;
        }

        let (status, body) = send(
            &app,
            request("GET", "/api/admin/containers?page=1", Some("root"), true),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["containers"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"]["meta"]["totalItems"], 2);

        let (status, body) = send(
            &app,
            request("DELETE", "/api/admin/containers?user_id=alice", Some("root"), true),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["removed"], true);
        assert_eq!(runtime.workloads().len(), 1);

        let (_, body) = send(
            &app,
            request("DELETE", "/api/admin/containers?user_id=alice", Some("root"), true),
        )
        .await;
        assert_eq!(body["data"]["removed"], false);
    }

    #[tokio::test]
    async fn test_admin_force_renew() {
        let (app, _) = setup_app(Duration::ZERO).await;
        send(
            &app,
            request("POST", "/api/container?challenge_id=1", Some("alice"), false),
        )
        .await;

        let (status, body) = send(
            &app,
            request(
                "PATCH",
                "/api/admin/containers?user_id=alice&challenge_id=1",
                Some("root"),
                true,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["type"], "redirect");
    }

    #[tokio::test]
    async fn test_admin_orphan_dry_run() {
        let (app, _) = setup_app(Duration::ZERO).await;

        let (status, body) = send(
            &app,
            request("POST", "/api/admin/orphans?dry_run=true", Some("root"), true),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["found"], 0);
        assert_eq!(body["data"]["removed"], 0);
    }
}
