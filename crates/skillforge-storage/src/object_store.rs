use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skillforge_types::Result;
use std::collections::BTreeMap;

/// The full contents of one skill version: relative path → raw bytes.
/// Ordered so two loads of identical bytes compare equal regardless of the
/// order the underlying backend happened to list entries in.
pub type FileTree = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestPointer {
    pub version: u32,
    pub published_at: DateTime<Utc>,
}

/// Content storage of versioned skill packages.
///
/// Deliberately narrow, not a general object-store abstraction. Version
/// directories are immutable once written;
/// `latest.json` is written last during publish and is the commit point —
/// on read, the object listing under a version prefix is the complete file
/// set for that version.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_version(&self, skill_id: &str, version: u32, files: &FileTree) -> Result<String>;

    async fn get_version(&self, skill_id: &str, version: u32) -> Result<FileTree>;

    async fn list_versions(&self, skill_id: &str) -> Result<Vec<u32>>;

    async fn delete_version(&self, skill_id: &str, version: u32) -> Result<()>;

    /// Mirrors every object under `skills/` into `local_cache_dir`, returning
    /// the number of objects copied. Used by a `remote`-backed instance to
    /// warm a local read cache; a no-op count for the `local` backend since
    /// it already *is* the cache.
    async fn sync_all(&self, local_cache_dir: &std::path::Path) -> Result<usize>;

    /// Writes (or overwrites) the commit-pointer object for a skill id.
    async fn put_latest(&self, skill_id: &str, pointer: &LatestPointer) -> Result<()>;

    /// Reads the commit-pointer object, if one has ever been published.
    async fn get_latest(&self, skill_id: &str) -> Result<Option<LatestPointer>>;
}
