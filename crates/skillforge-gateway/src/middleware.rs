//! Response security headers and the admin bearer-token gate, grounded on
//! the teacher's `security_headers`/`require_auth` middleware pair.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use skillforge_vault::TokenVerifier;

use crate::state::AppState;

pub async fn security_headers(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

/// Gates the `/admin/*` surface behind `ADMIN_AUTH_TOKEN`. Per §9, no token
/// configured means the admin surface is unauthenticated — that is a
/// deployment choice the operator makes by setting (or not setting) the
/// env var, not something this middleware second-guesses.
pub async fn require_admin_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(verifier) = &state.admin_verifier else {
        return next.run(req).await;
    };

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    let Some(token) = token else {
        return unauthorized();
    };

    match verifier.verify(token).await {
        Ok(_) => next.run(req).await,
        Err(_) => unauthorized(),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "missing or invalid admin bearer token" })),
    )
        .into_response()
}
