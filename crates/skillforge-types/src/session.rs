use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    Active,
    Suspended,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Initializing => "initializing",
            SessionState::Active => "active",
            SessionState::Suspended => "suspended",
            SessionState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Client-supplied identification captured from the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// A capability set as exchanged during `initialize`. Unknown capabilities
/// sent by a client are accepted and ignored rather than rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub tools: bool,
    #[serde(default)]
    pub prompts: bool,
    #[serde(default)]
    pub resources: bool,
}

impl Capabilities {
    /// The capability set the server always advertises once a session
    /// reaches `active`: `{tools: true, prompts: true, resources: true}`.
    pub fn server_default() -> Self {
        Capabilities {
            tools: true,
            prompts: true,
            resources: true,
        }
    }
}

/// A server-initiated JSON-RPC notification buffered for delivery on the
/// next `GET /mcp` read. The ring holds at most 256 entries per session;
/// eviction of the oldest entry is the registry's responsibility, not this
/// type's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingNotification {
    pub method: String,
    pub params: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub protocol_version: String,
    pub client_info: Option<ClientInfo>,
    pub client_capabilities: Capabilities,
    pub server_capabilities: Capabilities,
    pub auth_subject: Option<String>,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub pending_notifications: Vec<PendingNotification>,
}

impl Session {
    pub fn is_usable(&self) -> bool {
        matches!(self.state, SessionState::Active | SessionState::Initializing)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}
