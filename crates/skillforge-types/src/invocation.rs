use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum byte length of `params_excerpt`; longer argument payloads are
/// truncated (at a UTF-8 char boundary) before being logged.
pub const PARAMS_EXCERPT_MAX_BYTES: usize = 1024;

pub const DEFAULT_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Success,
    Error,
}

impl std::fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InvocationStatus::Success => "success",
            InvocationStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// One record of a dispatched `tools/call`. `invoked_at` doubles as the sort
/// key within a skill's partition: an RFC 3339 timestamp, `#`, then a UUID
/// suffix, so two events in the same millisecond never collide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationEvent {
    pub skill_id: String,
    pub session_id: String,
    pub method: String,
    pub invoked_at: String,
    pub duration_ms: u64,
    pub status: InvocationStatus,
    pub error_message: Option<String>,
    pub params_excerpt: String,
    /// Epoch-seconds TTL deadline; the store's reaper deletes rows past it.
    pub expires_at: i64,
}

fn truncate_excerpt(raw: &str) -> String {
    if raw.len() <= PARAMS_EXCERPT_MAX_BYTES {
        return raw.to_string();
    }
    let mut end = PARAMS_EXCERPT_MAX_BYTES;
    while end > 0 && !raw.is_char_boundary(end) {
        end -= 1;
    }
    raw[..end].to_string()
}

fn invoked_at_key(now: DateTime<Utc>) -> String {
    format!("{}#{}", now.to_rfc3339(), Uuid::new_v4())
}

impl InvocationEvent {
    pub fn new(
        skill_id: impl Into<String>,
        session_id: impl Into<String>,
        method: impl Into<String>,
        duration_ms: u64,
        status: InvocationStatus,
        error_message: Option<String>,
        params: &serde_json::Value,
        retention_days: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            skill_id: skill_id.into(),
            session_id: session_id.into(),
            method: method.into(),
            invoked_at: invoked_at_key(now),
            duration_ms,
            status,
            error_message,
            params_excerpt: truncate_excerpt(&params.to_string()),
            expires_at: now.timestamp() + retention_days * 86_400,
        }
    }
}
