//! Maps `skillforge_types::Error` onto HTTP responses for the admin REST
//! surface (the `/mcp` surface instead wraps every `Error` in a JSON-RPC
//! envelope via `skillforge_protocol::JsonRpcError`, never an HTTP status).
//!
//! A local newtype is required here, not a direct `impl IntoResponse for
//! Error`: both the trait and the error type live in other crates.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use skillforge_types::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::ProtocolMismatch => StatusCode::BAD_REQUEST,
        Error::SessionNotFound => StatusCode::NOT_FOUND,
        Error::ToolNotFound(_) => StatusCode::NOT_FOUND,
        Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
        Error::InvalidManifest(_) | Error::InvalidSkillId(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::PackageTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        Error::StorageUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        Error::Timeout => StatusCode::GATEWAY_TIMEOUT,
        Error::Cancelled => StatusCode::BAD_REQUEST,
        Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_not_found_maps_to_404() {
        let response = ApiError(Error::ToolNotFound("echo".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn package_too_large_maps_to_413() {
        let response = ApiError(Error::PackageTooLarge("too big".into())).into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
