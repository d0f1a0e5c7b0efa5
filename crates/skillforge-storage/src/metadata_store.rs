use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skillforge_types::{Result, SkillStatus};

/// The MetadataStore's row for one skill id: the active version, the full
/// version index, and the invocation counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillMetadataRow {
    pub skill_id: String,
    pub status: SkillStatus,
    pub active_version: u32,
    pub all_versions: Vec<u32>,
    pub invocation_count: u64,
    pub last_invoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-skill metadata, counters, and version index, with atomic updates.
///
/// Primary key `skill_id`; a secondary index on `(status, updated_at)` lets
/// `list(Some(Active))` enumerate the active catalog efficiently without a
/// full scan.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn put(&self, row: SkillMetadataRow) -> Result<()>;

    async fn get(&self, skill_id: &str) -> Result<Option<SkillMetadataRow>>;

    async fn list(&self, status: Option<SkillStatus>) -> Result<Vec<SkillMetadataRow>>;

    async fn delete(&self, skill_id: &str) -> Result<()>;

    /// Atomically adds one to `invocation_count` and sets `last_invoked_at`.
    /// Retried up to 3 times with bounded backoff on failure; a persistent
    /// failure is swallowed (counter drift is acceptable, invocation
    /// correctness is not coupled to it) rather than surfaced to the caller.
    async fn increment_invocation(&self, skill_id: &str, at: DateTime<Utc>);
}
