//! The `/mcp` Streamable HTTP surface (C8): `POST` carries JSON-RPC
//! requests (single or batched), `GET` is the long-poll SSE channel for
//! server-initiated notifications, `DELETE` closes a session.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::Stream;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use skillforge_protocol::{JsonRpcRequest, JsonRpcResponse};
use skillforge_types::Error;

use crate::error_response::ApiError;
use crate::state::AppState;

/// Header names are case-insensitive per RFC 9110 and `HeaderMap::get`
/// already matches regardless of casing, so accepting the 2024-11-05
/// revision's lowercase `mcp-session-id` alongside the canonical
/// `Mcp-Session-Id` requires no special-casing on input; this constant is
/// only used to choose the casing emitted on output.
pub static SESSION_HEADER: HeaderName = HeaderName::from_static("mcp-session-id");

#[derive(Deserialize)]
#[serde(untagged)]
enum McpBody {
    Batch(Vec<JsonRpcRequest>),
    Single(JsonRpcRequest),
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(&SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/event-stream"))
        .unwrap_or(false)
}

pub async fn post_mcp(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session_id = session_id_from_headers(&headers);
    let parsed: McpBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("invalid JSON-RPC body: {err}") })),
            )
                .into_response()
        }
    };
    let requests = match parsed {
        McpBody::Batch(requests) => requests,
        McpBody::Single(request) => vec![request],
    };
    let is_batch = matches!(
        serde_json::from_slice::<serde_json::Value>(&body),
        Ok(serde_json::Value::Array(_))
    );

    if wants_event_stream(&headers) {
        return stream_response(state, session_id, requests).into_response();
    }

    let mut responses = Vec::new();
    let mut out_session_id = session_id;
    for request in requests {
        let outcome = state
            .engine
            .dispatch(out_session_id.clone(), request, CancellationToken::new())
            .await;
        if outcome.session_id.is_some() {
            out_session_id = outcome.session_id;
        }
        if let Some(response) = outcome.response {
            responses.push(response);
        }
    }

    let mut http_response = if responses.is_empty() {
        StatusCode::NO_CONTENT.into_response()
    } else if is_batch {
        Json(responses).into_response()
    } else {
        Json(responses.into_iter().next()).into_response()
    };

    if let Some(session_id) = out_session_id {
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            http_response.headers_mut().insert(SESSION_HEADER.clone(), value);
        }
    }
    http_response
}

/// Builds the `text/event-stream` branch of `POST /mcp`. The cancellation
/// token is cancelled when the generated stream is dropped without
/// completing — the signal axum gives a disconnected SSE client — so
/// `MCPEngine::dispatch` sees it at its one suspension point mid-call.
fn stream_response(
    state: AppState,
    session_id: Option<String>,
    requests: Vec<JsonRpcRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    struct CancelOnDrop(CancellationToken);
    impl Drop for CancelOnDrop {
        fn drop(&mut self) {
            self.0.cancel();
        }
    }

    let stream = async_stream::stream! {
        let cancellation = CancellationToken::new();
        let _guard = CancelOnDrop(cancellation.clone());
        let mut session_id = session_id;
        for request in requests {
            let outcome = state.engine.dispatch(session_id.clone(), request, cancellation.clone()).await;
            if outcome.session_id.is_some() {
                session_id = outcome.session_id;
            }
            if let Some(response) = outcome.response {
                if let Ok(data) = serde_json::to_string(&response) {
                    yield Ok(Event::default().event("message").data(data));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}

pub async fn get_mcp(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session_id = session_id_from_headers(&headers).ok_or(ApiError(Error::SessionNotFound))?;
    state.sessions.touch(&session_id)?;

    let sessions = state.sessions.clone();
    let stream = async_stream::stream! {
        loop {
            let pending = sessions.drain_notifications(&session_id);
            for note in pending {
                let payload = serde_json::json!({ "method": note.method, "params": note.params });
                if let Ok(data) = serde_json::to_string(&payload) {
                    yield Ok(Event::default().event("message").data(data));
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping")))
}

pub async fn delete_mcp(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(session_id) = session_id_from_headers(&headers) {
        state.sessions.close(&session_id);
    }
    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("Mcp-Session-Id", HeaderValue::from_static("abc-123"));
        assert_eq!(session_id_from_headers(&headers), Some("abc-123".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert("mcp-session-id", HeaderValue::from_static("abc-123"));
        assert_eq!(session_id_from_headers(&headers), Some("abc-123".to_string()));
    }

    #[test]
    fn accept_header_selects_event_stream_branch() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        assert!(wants_event_stream(&headers));

        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!wants_event_stream(&headers));
    }

    #[test]
    fn single_request_body_parses_as_mcp_body() {
        let body = serde_json::json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });
        let parsed: McpBody = serde_json::from_value(body).unwrap();
        assert!(matches!(parsed, McpBody::Single(_)));
    }

    #[test]
    fn batched_request_body_parses_as_mcp_body() {
        let body = serde_json::json!([
            { "jsonrpc": "2.0", "id": 1, "method": "ping" },
            { "jsonrpc": "2.0", "method": "initialized" },
        ]);
        let parsed: McpBody = serde_json::from_value(body).unwrap();
        assert!(matches!(parsed, McpBody::Batch(_)));
    }
}
