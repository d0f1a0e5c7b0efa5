//! Liveness, readiness, and static info endpoints (§10).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use skillforge_session::SUPPORTED_PROTOCOL_VERSIONS;

use crate::config::StorageBackend;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "up" }))
}

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let catalog_ok = state.config.allow_empty_catalog || !state.catalog.list().await.is_empty();
    let metadata_ok = state.metadata_store.list(None).await.is_ok();

    if catalog_ok && metadata_ok {
        (StatusCode::OK, Json(serde_json::json!({ "ready": true }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "ready": false })),
        )
            .into_response()
    }
}

pub async fn info(State(state): State<AppState>) -> impl IntoResponse {
    let backend = match state.config.storage_backend {
        StorageBackend::Local => "local",
        StorageBackend::Remote => "remote",
    };
    Json(serde_json::json!({
        "name": "skillforge-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol_versions": SUPPORTED_PROTOCOL_VERSIONS,
        "storage_backend": backend,
        "dropped_events_total": state.invocation_log.dropped_events_total(),
    }))
}
