//! SkillCatalog (C5): the in-memory, query-optimized view over the
//! metadata store and object store, and the only component that mutates
//! either of them on a skill's behalf.
//!
//! Every mutating operation (`publish`, `rollback`, `reload`, `unload`)
//! takes a per-id lock before touching storage, so two admin requests for
//! the same skill id serialize instead of racing; requests for different
//! ids run concurrently. `boot` walks the metadata store once at startup
//! and loads every active skill; a load failure is recorded on that one
//! skill rather than aborting the rest.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use skillforge_storage::{FileTree, LatestPointer, MetadataStore, ObjectStore, SkillMetadataRow};
use skillforge_types::{Error, Result, Skill, SkillStatus};

use crate::loader::{load_skill, validate_package, LoadLimits};

/// A skill's id is not known until its `SKILL.md` has been parsed, so a
/// publish is split: unpack and validate first, then take the lock keyed
/// by the manifest's `name` before touching storage.
struct IdLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdLocks {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct SkillCatalog {
    object_store: Arc<dyn ObjectStore>,
    metadata_store: Arc<dyn MetadataStore>,
    limits: LoadLimits,
    skills: RwLock<HashMap<String, Skill>>,
    id_locks: IdLocks,
}

impl SkillCatalog {
    pub fn new(object_store: Arc<dyn ObjectStore>, metadata_store: Arc<dyn MetadataStore>) -> Self {
        Self {
            object_store,
            metadata_store,
            limits: LoadLimits::default(),
            skills: RwLock::new(HashMap::new()),
            id_locks: IdLocks::new(),
        }
    }

    /// Loads every skill the metadata store lists as active, fetching its
    /// content from the object store and building the in-memory catalog.
    /// A single skill's content being missing or failing validation is
    /// recorded as `status = error` on that skill; it never aborts the
    /// boot of the rest of the catalog.
    pub async fn boot(&self) -> Result<usize> {
        let rows = self.metadata_store.list(Some(SkillStatus::Active)).await?;
        let mut skills = self.skills.write().await;
        let mut loaded = 0;
        for row in rows {
            let skill = match self
                .object_store
                .get_version(&row.skill_id, row.active_version)
                .await
            {
                Ok(files) => load_skill(&row.skill_id, row.active_version, &files, &self.limits),
                Err(err) => {
                    tracing::warn!(skill_id = %row.skill_id, version = row.active_version, error = %err, "failed to fetch skill content during boot");
                    error_skill(&row, &err)
                }
            };
            if skill.status == SkillStatus::Active {
                loaded += 1;
            }
            skills.insert(row.skill_id.clone(), skill);
        }
        Ok(loaded)
    }

    pub async fn list(&self) -> Vec<Skill> {
        self.skills.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<Skill> {
        self.skills.read().await.get(id).cloned()
    }

    /// Validates an uploaded package without publishing it. Used by the
    /// `/admin/skills/validate` surface: runs the identical pipeline
    /// `publish` does, minus the storage writes and the catalog flip.
    pub fn validate(&self, files: &FileTree) -> Result<()> {
        validate_package(files, &self.limits).map(|_| ())
    }

    /// Unpacks, validates, and stores a new version of the skill named by
    /// the package's own manifest, then atomically flips the catalog to
    /// serve it. The id is derived from the validated `SKILL.md`, not
    /// supplied by the caller: the admin upload surface has no other
    /// source for it.
    pub async fn publish(&self, files: FileTree) -> Result<Skill> {
        let (manifest, _, _) = validate_package(&files, &self.limits)?;
        let id = manifest.name.clone();
        let lock = self.id_locks.lock_for(&id).await;
        let _guard = lock.lock().await;

        let existing = self.metadata_store.get(&id).await?;
        // Not `active_version + 1`: a rollback moves `active_version`
        // backward without truncating `all_versions`, so the next publish
        // must come after every version ever written, not just the active
        // one.
        let next_version = existing
            .as_ref()
            .map(|row| row.all_versions.iter().copied().max().unwrap_or(0) + 1)
            .unwrap_or(1);

        self.object_store.put_version(&id, next_version, &files).await?;
        self.object_store
            .put_latest(
                &id,
                &LatestPointer {
                    version: next_version,
                    published_at: Utc::now(),
                },
            )
            .await?;

        let skill = load_skill(&id, next_version, &files, &self.limits);
        let mut all_versions = existing.map(|row| row.all_versions).unwrap_or_default();
        all_versions.push(next_version);
        let row = SkillMetadataRow {
            skill_id: id.clone(),
            status: skill.status,
            active_version: next_version,
            all_versions,
            invocation_count: skill.invocation_count,
            last_invoked_at: skill.last_invoked_at,
            created_at: skill.created_at,
            updated_at: skill.updated_at,
        };
        self.metadata_store.put(row).await?;

        self.skills.write().await.insert(id.clone(), skill.clone());
        Ok(skill)
    }

    /// Re-points the active version of `id` to `target_version`, which must
    /// already exist in the object store's version history.
    pub async fn rollback(&self, id: &str, target_version: u32) -> Result<Skill> {
        let lock = self.id_locks.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut row = self
            .metadata_store
            .get(id)
            .await?
            .ok_or_else(|| Error::ToolNotFound(id.to_string()))?;
        if !row.all_versions.contains(&target_version) {
            return Err(Error::InvalidManifest(format!(
                "skill {id} has no version {target_version} to roll back to"
            )));
        }

        let files = self.object_store.get_version(id, target_version).await?;
        let skill = load_skill(id, target_version, &files, &self.limits);

        self.object_store
            .put_latest(
                id,
                &LatestPointer {
                    version: target_version,
                    published_at: Utc::now(),
                },
            )
            .await?;

        row.active_version = target_version;
        row.status = skill.status;
        row.updated_at = Utc::now();
        self.metadata_store.put(row).await?;

        self.skills.write().await.insert(id.to_string(), skill.clone());
        Ok(skill)
    }

    /// Re-fetches and re-validates the currently active version's content
    /// from the object store, without changing which version is active.
    /// Used to recover from a transient load failure or to pick up a
    /// security-scan rule change without a new upload.
    pub async fn reload(&self, id: &str) -> Result<Skill> {
        let lock = self.id_locks.lock_for(id).await;
        let _guard = lock.lock().await;

        let row = self
            .metadata_store
            .get(id)
            .await?
            .ok_or_else(|| Error::ToolNotFound(id.to_string()))?;
        let files = self.object_store.get_version(id, row.active_version).await?;
        let skill = load_skill(id, row.active_version, &files, &self.limits);
        self.skills.write().await.insert(id.to_string(), skill.clone());
        Ok(skill)
    }

    /// Reloads every currently cataloged skill, in id order, first
    /// unioning in the ids of any skill the metadata store lists as
    /// `active` but this instance hasn't loaded yet. That union is what
    /// makes this the cross-instance sync mechanism (§4.5): a skill
    /// published on another instance has no in-memory entry here until its
    /// id is picked up from `metadata_store.list(Some(Active))` on some
    /// refresh cycle. Returns the number that came back `Active`.
    pub async fn reload_all(&self) -> Result<usize> {
        let mut ids: std::collections::BTreeSet<String> =
            self.skills.read().await.keys().cloned().collect();
        let active_rows = self.metadata_store.list(Some(SkillStatus::Active)).await?;
        ids.extend(active_rows.into_iter().map(|row| row.skill_id));

        let mut active = 0;
        for id in ids {
            match self.reload(&id).await {
                Ok(skill) if skill.status == SkillStatus::Active => active += 1,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(skill_id = %id, error = %err, "reload failed during catalog refresh");
                }
            }
        }
        Ok(active)
    }

    /// Bumps the in-memory `invocation_count`/`last_invoked_at` on a
    /// cataloged skill after a dispatched `tools/call`. Best-effort: a
    /// skill unloaded between dispatch and this call is silently ignored.
    /// The durable counter lives in C2 and is updated separately by the
    /// caller; this only keeps the in-memory view current for readers of
    /// `list()`/`get()`.
    pub async fn record_invocation(&self, id: &str) {
        let mut skills = self.skills.write().await;
        if let Some(skill) = skills.get_mut(id) {
            skill.invocation_count += 1;
            skill.last_invoked_at = Some(Utc::now());
        }
    }

    /// Marks a skill inactive and removes it from the in-memory catalog.
    /// Its version history and metadata row are left intact so it can be
    /// re-published later; only the object store retains the bytes.
    pub async fn unload(&self, id: &str) -> Result<()> {
        let lock = self.id_locks.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut row = self
            .metadata_store
            .get(id)
            .await?
            .ok_or_else(|| Error::ToolNotFound(id.to_string()))?;
        row.status = SkillStatus::Inactive;
        row.updated_at = Utc::now();
        self.metadata_store.put(row).await?;
        self.skills.write().await.remove(id);
        Ok(())
    }
}

fn error_skill(row: &SkillMetadataRow, err: &Error) -> Skill {
    use skillforge_types::{SkillFiles, SkillManifest};
    Skill {
        id: row.skill_id.clone(),
        version: row.active_version,
        manifest: SkillManifest {
            name: row.skill_id.clone(),
            description: format!("failed to load: {err}"),
            license: None,
            allowed_tools: Vec::new(),
            user_invocable: false,
            model: None,
            context: None,
            metadata: Default::default(),
        },
        instructions: String::new(),
        files: SkillFiles::default(),
        status: SkillStatus::Error,
        load_error: Some(err.to_string()),
        invocation_count: row.invocation_count,
        last_invoked_at: row.last_invoked_at,
        created_at: row.created_at,
        updated_at: Utc::now(),
    }
}

/// Resolves a version cache directory for on-disk backed object stores. Not
/// used by the in-memory test fixtures, but kept alongside the catalog
/// since it is catalog-scoped configuration, not storage-backend state.
pub fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("skillforge-cache")
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillforge_storage::{LocalMetadataStore, LocalObjectStore, SqliteHandle};
    use std::sync::Arc;

    const VALID_SKILL_MD: &[u8] =
        b"---\nname: echo\ndescription: echoes the provided input\n---\n\nEcho the input back.\n";

    async fn test_catalog() -> (SkillCatalog, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let object_store = Arc::new(LocalObjectStore::new(dir.path().join("objects")));
        let db = SqliteHandle::open_in_memory().unwrap();
        let metadata_store = Arc::new(LocalMetadataStore::new(db));
        (SkillCatalog::new(object_store, metadata_store), dir)
    }

    fn files(entries: &[(&str, &[u8])]) -> FileTree {
        entries.iter().map(|(p, c)| (p.to_string(), c.to_vec())).collect()
    }

    #[tokio::test]
    async fn publish_then_get_round_trips() {
        let (catalog, _dir) = test_catalog().await;
        let published = catalog.publish(files(&[("SKILL.md", VALID_SKILL_MD)])).await.unwrap();
        assert_eq!(published.version, 1);
        let fetched = catalog.get("echo").await.unwrap();
        assert_eq!(fetched.id, "echo");
    }

    #[tokio::test]
    async fn republish_increments_version() {
        let (catalog, _dir) = test_catalog().await;
        catalog.publish(files(&[("SKILL.md", VALID_SKILL_MD)])).await.unwrap();
        let second = catalog.publish(files(&[("SKILL.md", VALID_SKILL_MD)])).await.unwrap();
        assert_eq!(second.version, 2);
    }

    #[tokio::test]
    async fn rollback_restores_prior_version_content() {
        let (catalog, _dir) = test_catalog().await;
        catalog.publish(files(&[("SKILL.md", VALID_SKILL_MD)])).await.unwrap();
        let v2_md = b"---\nname: echo\ndescription: a newer echo description\n---\n\nbody\n".to_vec();
        catalog.publish(files(&[("SKILL.md", &v2_md)])).await.unwrap();

        let rolled_back = catalog.rollback("echo", 1).await.unwrap();
        assert_eq!(rolled_back.version, 1);
        assert_eq!(rolled_back.manifest.description, "echoes the provided input");
    }

    #[tokio::test]
    async fn republish_after_rollback_skips_past_versions_already_written() {
        let (catalog, _dir) = test_catalog().await;
        catalog.publish(files(&[("SKILL.md", VALID_SKILL_MD)])).await.unwrap(); // v1
        let v2_md = b"---\nname: echo\ndescription: a newer echo description\n---\n\nbody\n".to_vec();
        catalog.publish(files(&[("SKILL.md", &v2_md)])).await.unwrap(); // v2
        catalog.rollback("echo", 1).await.unwrap();

        let v3_md = b"---\nname: echo\ndescription: yet another echo description\n---\n\nbody\n".to_vec();
        let republished = catalog.publish(files(&[("SKILL.md", &v3_md)])).await.unwrap();
        assert_eq!(republished.version, 3);
    }

    #[tokio::test]
    async fn rollback_rejects_unknown_version() {
        let (catalog, _dir) = test_catalog().await;
        catalog.publish(files(&[("SKILL.md", VALID_SKILL_MD)])).await.unwrap();
        assert!(catalog.rollback("echo", 99).await.is_err());
    }

    #[tokio::test]
    async fn unload_removes_from_in_memory_catalog() {
        let (catalog, _dir) = test_catalog().await;
        catalog.publish(files(&[("SKILL.md", VALID_SKILL_MD)])).await.unwrap();
        catalog.unload("echo").await.unwrap();
        assert!(catalog.get("echo").await.is_none());
    }

    #[tokio::test]
    async fn boot_loads_active_skills_from_storage() {
        let (catalog, _dir) = test_catalog().await;
        catalog.publish(files(&[("SKILL.md", VALID_SKILL_MD)])).await.unwrap();

        let object_store = catalog.object_store.clone();
        let metadata_store = catalog.metadata_store.clone();
        let fresh = SkillCatalog::new(object_store, metadata_store);
        let loaded = fresh.boot().await.unwrap();
        assert_eq!(loaded, 1);
        assert!(fresh.get("echo").await.is_some());
    }

    #[tokio::test]
    async fn record_invocation_bumps_in_memory_counters() {
        let (catalog, _dir) = test_catalog().await;
        catalog.publish(files(&[("SKILL.md", VALID_SKILL_MD)])).await.unwrap();
        catalog.record_invocation("echo").await;
        catalog.record_invocation("echo").await;
        let skill = catalog.get("echo").await.unwrap();
        assert_eq!(skill.invocation_count, 2);
        assert!(skill.last_invoked_at.is_some());
    }

    #[tokio::test]
    async fn record_invocation_on_unknown_skill_is_a_no_op() {
        let (catalog, _dir) = test_catalog().await;
        catalog.record_invocation("nope").await;
    }

    #[tokio::test]
    async fn publish_rejects_invalid_package_without_touching_storage() {
        let (catalog, _dir) = test_catalog().await;
        let bad = files(&[("references/foo.md", b"no SKILL.md here")]);
        assert!(catalog.publish(bad).await.is_err());
        assert!(catalog.get("echo").await.is_none());
    }

    #[tokio::test]
    async fn reload_all_picks_up_a_skill_published_via_shared_storage_only() {
        // Simulates what the cron-driven refresh job must do across
        // instances: a second `SkillCatalog` sharing the same backing
        // stores publishes a skill this instance never called `publish`
        // on, so it starts out with no in-memory entry for it at all.
        let (catalog, _dir) = test_catalog().await;
        let peer = SkillCatalog::new(catalog.object_store.clone(), catalog.metadata_store.clone());
        peer.publish(files(&[("SKILL.md", VALID_SKILL_MD)])).await.unwrap();

        assert!(catalog.get("echo").await.is_none());
        let active = catalog.reload_all().await.unwrap();
        assert_eq!(active, 1);
        assert!(catalog.get("echo").await.is_some());
    }
}
