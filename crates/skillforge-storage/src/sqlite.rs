use rusqlite::Connection;
use skillforge_types::{Error, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A shared synchronous `rusqlite` connection. The local backends of both
/// the MetadataStore and the InvocationLog open the same on-disk database
/// through this handle (mirroring the teacher's pattern of one sqlite file
/// per concern), and every call site reaches it through
/// `tokio::task::spawn_blocking` so a slow query never stalls the async
/// runtime's worker threads.
#[derive(Clone)]
pub struct SqliteHandle(Arc<Mutex<Connection>>);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS skill_metadata (
    skill_id        TEXT PRIMARY KEY,
    status          TEXT NOT NULL,
    active_version  INTEGER NOT NULL,
    all_versions    TEXT NOT NULL,
    invocation_count INTEGER NOT NULL DEFAULT 0,
    last_invoked_at TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_skill_metadata_status_updated
    ON skill_metadata (status, updated_at);

CREATE TABLE IF NOT EXISTS invocation_log (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    skill_id        TEXT NOT NULL,
    session_id      TEXT NOT NULL,
    method          TEXT NOT NULL,
    invoked_at      TEXT NOT NULL,
    duration_ms     INTEGER NOT NULL,
    status          TEXT NOT NULL,
    error_message   TEXT,
    params_excerpt  TEXT NOT NULL,
    expires_at      INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_invocation_log_skill_invoked
    ON invocation_log (skill_id, invoked_at);
CREATE INDEX IF NOT EXISTS idx_invocation_log_expires
    ON invocation_log (expires_at);
";

impl SqliteHandle {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self(Arc::new(Mutex::new(conn))))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self(Arc::new(Mutex::new(conn))))
    }

    /// Runs `f` against the connection on a blocking-pool thread.
    pub async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.0.clone();
        tokio::task::spawn_blocking(move || {
            let conn = handle.lock().expect("sqlite connection mutex poisoned");
            f(&conn).map_err(Error::from)
        })
        .await
        .map_err(|e| Error::internal(format!("blocking task join failed: {e}")))?
    }
}
