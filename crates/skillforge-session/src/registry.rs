use chrono::{DateTime, Duration, Utc};
use skillforge_types::{
    Capabilities, ClientInfo, Error, PendingNotification, Result, Session, SessionState,
};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::protocol_version::negotiate;

const PENDING_NOTIFICATIONS_RING_SIZE: usize = 256;

pub struct SessionRegistryConfig {
    pub idle_timeout: Duration,
    pub suspended_expiry: Duration,
}

impl Default for SessionRegistryConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::minutes(15),
            suspended_expiry: Duration::hours(24),
        }
    }
}

/// Per-session state, capability negotiation, suspension/expiry (C6).
///
/// Lookup is lock-free in spirit (a single `RwLock` read guard, never held
/// across an `.await`); mutation takes the write guard only for the
/// duration of the in-memory map update.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    config: SessionRegistryConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionRegistryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Handles `initialize`: negotiates a protocol version and creates a new
    /// session in `initializing` state. No session is created if no common
    /// protocol version exists.
    pub fn initialize(
        &self,
        client_versions: &[String],
        client_info: Option<ClientInfo>,
        client_capabilities: Capabilities,
    ) -> Result<Session> {
        let protocol_version = negotiate(client_versions).ok_or(Error::ProtocolMismatch)?;
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            state: SessionState::Initializing,
            protocol_version,
            client_info,
            client_capabilities,
            server_capabilities: Capabilities::server_default(),
            auth_subject: None,
            scopes: Vec::new(),
            created_at: now,
            last_activity_at: now,
            expires_at: now + self.config.suspended_expiry,
            pending_notifications: Vec::new(),
        };
        self.sessions
            .write()
            .expect("session map mutex poisoned")
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    /// Handles the `initialized` notification: transitions a session from
    /// `initializing` to `active`.
    pub fn mark_initialized(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().expect("session map mutex poisoned");
        let session = sessions.get_mut(session_id).ok_or(Error::SessionNotFound)?;
        session.state = SessionState::Active;
        session.last_activity_at = Utc::now();
        Ok(())
    }

    /// Looks up a session for request dispatch. Any request against a
    /// `closed` or unknown session id is a `session-not-found` error.
    pub fn get(&self, session_id: &str) -> Result<Session> {
        let sessions = self.sessions.read().expect("session map mutex poisoned");
        match sessions.get(session_id) {
            Some(session) if session.state != SessionState::Closed => Ok(session.clone()),
            _ => Err(Error::SessionNotFound),
        }
    }

    /// Records request activity: bumps `last_activity_at` and, per the
    /// state diagram, a `suspended` session receiving any request returns to
    /// `active`.
    pub fn touch(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().expect("session map mutex poisoned");
        let session = sessions.get_mut(session_id).ok_or(Error::SessionNotFound)?;
        if session.state == SessionState::Closed {
            return Err(Error::SessionNotFound);
        }
        session.last_activity_at = Utc::now();
        if session.state == SessionState::Suspended {
            session.state = SessionState::Active;
        }
        Ok(())
    }

    /// `DELETE /mcp`: explicit, idempotent session close.
    pub fn close(&self, session_id: &str) {
        let mut sessions = self.sessions.write().expect("session map mutex poisoned");
        if let Some(session) = sessions.get_mut(session_id) {
            session.state = SessionState::Closed;
        }
    }

    /// Appends a server-initiated notification to the session's pending
    /// buffer, evicting the oldest entry once the 256-entry ring is full.
    pub fn enqueue_notification(&self, session_id: &str, method: &str, params: serde_json::Value) {
        let mut sessions = self.sessions.write().expect("session map mutex poisoned");
        if let Some(session) = sessions.get_mut(session_id) {
            if session.pending_notifications.len() >= PENDING_NOTIFICATIONS_RING_SIZE {
                session.pending_notifications.remove(0);
            }
            session.pending_notifications.push(PendingNotification {
                method: method.to_string(),
                params,
                enqueued_at: Utc::now(),
            });
        }
    }

    /// Drains and returns all buffered notifications for a session (used by
    /// `GET /mcp` on (re)connect).
    pub fn drain_notifications(&self, session_id: &str) -> Vec<PendingNotification> {
        let mut sessions = self.sessions.write().expect("session map mutex poisoned");
        match sessions.get_mut(session_id) {
            Some(session) => std::mem::take(&mut session.pending_notifications),
            None => Vec::new(),
        }
    }

    /// The reaper: drives `active -> suspended` on idle timeout and
    /// `suspended -> closed` on expiry, purging closed sessions from memory.
    /// Returns `(suspended, closed)` counts for observability.
    pub fn reap(&self, now: DateTime<Utc>) -> (usize, usize) {
        let mut sessions = self.sessions.write().expect("session map mutex poisoned");
        let mut suspended = 0;
        let mut closed = 0;
        let idle_timeout = self.config.idle_timeout;
        let suspended_expiry = self.config.suspended_expiry;
        for session in sessions.values_mut() {
            match session.state {
                SessionState::Active | SessionState::Initializing => {
                    if now - session.last_activity_at > idle_timeout {
                        session.state = SessionState::Suspended;
                        session.expires_at = now + suspended_expiry;
                        suspended += 1;
                    }
                }
                SessionState::Suspended => {
                    if now > session.expires_at {
                        session.state = SessionState::Closed;
                        closed += 1;
                    }
                }
                SessionState::Closed => {}
            }
        }
        sessions.retain(|_, session| session.state != SessionState::Closed);
        (suspended, closed)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().expect("session map mutex poisoned").len()
    }
}
