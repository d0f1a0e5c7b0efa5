//! Assembles the axum `Router`: the `/mcp` surface is open by default
//! (§9 — production deployments plug in an external token verifier in
//! front of it), the `/admin` surface is gated behind `require_admin_auth`.

use axum::http::Method;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::middleware::{require_admin_auth, security_headers};
use crate::state::AppState;
use crate::{admin, health, mcp};

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
}

pub fn build_router(state: AppState) -> Router {
    let mcp_routes = Router::new()
        .route("/mcp", post(mcp::post_mcp).get(mcp::get_mcp).delete(mcp::delete_mcp))
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/info", get(health::info))
        .layer(middleware::from_fn(security_headers))
        .layer(cors_layer());

    let admin_routes = Router::new()
        .route("/admin/skills", get(admin::list_skills))
        .route("/admin/skills/upload", post(admin::upload_skill))
        .route("/admin/skills/validate", post(admin::validate_skill))
        .route("/admin/skills/reload-all", post(admin::reload_all))
        .route("/admin/logs/stream", get(admin::logs_stream))
        .route("/admin/skills/{id}", get(admin::get_skill).delete(admin::delete_skill))
        .route("/admin/skills/{id}/instructions", get(admin::get_instructions))
        .route("/admin/skills/{id}/logs", get(admin::get_logs))
        .route("/admin/skills/{id}/versions", get(admin::get_versions))
        .route("/admin/skills/{id}/reload", post(admin::reload_skill))
        .route("/admin/skills/{id}/rollback", post(admin::rollback_skill))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin_auth))
        .layer(middleware::from_fn(security_headers));

    mcp_routes.merge(admin_routes).with_state(state)
}
