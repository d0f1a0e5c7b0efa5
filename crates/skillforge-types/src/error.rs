use std::fmt;

/// The error currency shared by every crate in the workspace.
///
/// Each variant corresponds to exactly one row of the error taxonomy: it is
/// what call sites return, what gets logged at the boundary that catches it,
/// and (in the gateway crate) what gets turned into an HTTP/JSON-RPC response.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no mutually supported MCP protocol version")]
    ProtocolMismatch,

    #[error("session not found or expired")]
    SessionNotFound,

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid skill id: {0}")]
    InvalidSkillId(String),

    #[error("package too large: {0}")]
    PackageTooLarge(String),

    #[error("storage unavailable: {context}")]
    StorageUnavailable {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    #[error("tool call timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The taxonomy kind as a stable lowercase-hyphenated token, used both as
    /// the JSON-RPC error `data.kind` field and for log correlation.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ProtocolMismatch => "protocol-mismatch",
            Error::SessionNotFound => "session-not-found",
            Error::ToolNotFound(_) => "tool-not-found",
            Error::PermissionDenied(_) => "permission-denied",
            Error::InvalidManifest(_) | Error::InvalidSkillId(_) => "invalid-manifest",
            Error::PackageTooLarge(_) => "package-too-large",
            Error::StorageUnavailable { .. } => "storage-unavailable",
            Error::Timeout => "timeout",
            Error::Cancelled => "cancelled",
            Error::Internal(_) => "internal",
        }
    }

    /// JSON-RPC 2.0 numeric error code. The taxonomy does not define its own
    /// code space, so application-level kinds live in the reserved
    /// implementation-defined range and carry the taxonomy kind in `data`.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Error::ProtocolMismatch => -32001,
            Error::SessionNotFound => -32002,
            Error::ToolNotFound(_) => -32003,
            Error::PermissionDenied(_) => -32004,
            Error::InvalidManifest(_) | Error::InvalidSkillId(_) => -32602,
            Error::PackageTooLarge(_) => -32005,
            Error::StorageUnavailable { .. } => -32006,
            Error::Timeout => -32007,
            Error::Cancelled => -32008,
            Error::Internal(_) => -32603,
        }
    }

    pub fn internal(msg: impl fmt::Display) -> Self {
        Error::Internal(msg.to_string())
    }

    pub fn storage_unavailable(msg: impl fmt::Display) -> Self {
        Error::StorageUnavailable {
            context: msg.to_string(),
            source: None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StorageUnavailable {
            context: "local metadata/invocation-log database".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::StorageUnavailable {
            context: "remote object-store backend".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_rpc_code_cover_every_taxonomy_row() {
        let errs: Vec<Error> = vec![
            Error::ProtocolMismatch,
            Error::SessionNotFound,
            Error::ToolNotFound("x".into()),
            Error::PermissionDenied("x".into()),
            Error::InvalidManifest("x".into()),
            Error::InvalidSkillId("x".into()),
            Error::PackageTooLarge("x".into()),
            Error::storage_unavailable("x"),
            Error::Timeout,
            Error::Cancelled,
            Error::internal("x"),
        ];
        for e in errs {
            assert!(!e.kind().is_empty());
            assert!(e.rpc_code() < 0);
        }
    }
}
