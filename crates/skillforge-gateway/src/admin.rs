//! The `/admin` REST surface (§6). Not part of MCP: these handlers bypass
//! session state entirely and mutate the catalog directly.

use std::convert::Infallible;

use axum::extract::{Multipart, Path, Query, State};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;

use skillforge_core::{validate_package, LoadLimits};
use skillforge_storage::{read_tree, unpack_into_scratch};
use skillforge_types::Error;

use crate::error_response::ApiError;
use crate::state::AppState;

type JsonResult = Result<Json<serde_json::Value>, ApiError>;

pub async fn list_skills(State(state): State<AppState>) -> JsonResult {
    let skills = state.catalog.list().await;
    Ok(Json(serde_json::json!({ "skills": skills })))
}

pub async fn get_skill(State(state): State<AppState>, Path(id): Path<String>) -> JsonResult {
    let skill = state
        .catalog
        .get(&id)
        .await
        .ok_or_else(|| Error::ToolNotFound(id.clone()))?;
    Ok(Json(serde_json::json!({ "skill": skill })))
}

pub async fn get_instructions(State(state): State<AppState>, Path(id): Path<String>) -> JsonResult {
    let skill = state
        .catalog
        .get(&id)
        .await
        .ok_or_else(|| Error::ToolNotFound(id.clone()))?;
    Ok(Json(serde_json::json!({ "instructions": skill.instructions })))
}

#[derive(Deserialize)]
pub struct LogsQuery {
    limit: Option<usize>,
}

pub async fn get_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> JsonResult {
    let logs = state
        .invocation_log
        .query(&id, None, query.limit.unwrap_or(50))
        .await?;
    Ok(Json(serde_json::json!({ "logs": logs })))
}

pub async fn get_versions(State(state): State<AppState>, Path(id): Path<String>) -> JsonResult {
    let row = state
        .metadata_store
        .get(&id)
        .await?
        .ok_or_else(|| Error::ToolNotFound(id.clone()))?;
    let versions: Vec<serde_json::Value> = row
        .all_versions
        .iter()
        .map(|&version| {
            let published_at = if version == row.active_version {
                Some(row.updated_at)
            } else {
                None
            };
            serde_json::json!({ "version": version, "published_at": published_at })
        })
        .collect();
    Ok(Json(serde_json::json!({ "versions": versions })))
}

pub async fn reload_skill(State(state): State<AppState>, Path(id): Path<String>) -> JsonResult {
    state.catalog.reload(&id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct RollbackBody {
    version: u32,
}

pub async fn rollback_skill(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RollbackBody>,
) -> JsonResult {
    state.catalog.rollback(&id, body.version).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn delete_skill(State(state): State<AppState>, Path(id): Path<String>) -> JsonResult {
    state.catalog.unload(&id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn reload_all(State(state): State<AppState>) -> JsonResult {
    let reloaded = state.catalog.reload_all().await?;
    Ok(Json(serde_json::json!({ "reloaded": reloaded })))
}

/// Tails the process's own structured log output as it's written, for
/// operators without shell access to the host. One broadcast channel feeds
/// every subscriber; a slow reader drops lagged lines rather than blocking
/// the writer.
pub async fn logs_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(line) => Ok(Event::default().data(line)),
        Err(_) => Ok(Event::default().data("[log stream lagged, lines dropped]")),
    });
    Sse::new(stream)
}

/// Reads the single file field out of a `multipart/form-data` upload,
/// capping the raw bytes at `MAX_PACKAGE_BYTES` *before* decompression so a
/// zip bomb cannot amplify past the limit inside the process (§11).
async fn read_upload_bytes(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    let limits = LoadLimits::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidManifest(format!("malformed multipart body: {e}")))?
    {
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidManifest(format!("could not read upload field: {e}")))?;
        if bytes.len() as u64 > limits.max_package_bytes {
            return Err(Error::PackageTooLarge(format!(
                "upload is {} bytes, exceeding the {} byte limit",
                bytes.len(),
                limits.max_package_bytes
            ))
            .into());
        }
        return Ok(bytes.to_vec());
    }
    Err(Error::InvalidManifest("multipart body carried no file field".to_string()).into())
}

pub async fn upload_skill(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = read_upload_bytes(multipart).await?;
    let scratch_root = state.config.skill_cache_dir.join("uploads");
    let extracted = unpack_into_scratch(bytes, scratch_root).await?;
    let files = read_tree(extracted).await?;
    let skill = state.catalog.publish(files).await?;
    Ok(Json(serde_json::json!({ "id": skill.id, "version": skill.version })))
}

pub async fn validate_skill(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = read_upload_bytes(multipart).await?;
    let scratch_root = state.config.skill_cache_dir.join("uploads");
    let extracted = unpack_into_scratch(bytes, scratch_root).await?;
    let files = read_tree(extracted).await?;
    match validate_package(&files, &LoadLimits::default()) {
        Ok(_) => Ok(Json(serde_json::json!({ "valid": true, "errors": [] }))),
        Err(err) => Ok(Json(serde_json::json!({ "valid": false, "errors": [err.to_string()] }))),
    }
}
