use async_trait::async_trait;
use skillforge_types::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::keys::{latest_key, version_from_key, version_prefix};
use crate::object_store::{FileTree, LatestPointer, ObjectStore};

/// `local` backend: lays the object-store key layout out under a directory
/// tree on local/shared disk. Selected by `STORAGE_BACKEND=local` (the
/// default).
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_version(&self, skill_id: &str, version: u32, files: &FileTree) -> Result<String> {
        let prefix = version_prefix(skill_id, version);
        let version_dir = self.path_for_key(&prefix);
        if version_dir.exists() {
            return Err(Error::internal(format!(
                "version directory already exists: {prefix}"
            )));
        }
        for (relative_path, bytes) in files {
            let dest = version_dir.join(relative_path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::storage_unavailable(e))?;
            }
            fs::write(&dest, bytes)
                .await
                .map_err(|e| Error::storage_unavailable(e))?;
        }
        Ok(prefix)
    }

    async fn get_version(&self, skill_id: &str, version: u32) -> Result<FileTree> {
        let version_dir = self.path_for_key(&version_prefix(skill_id, version));
        if !version_dir.exists() {
            return Err(Error::internal(format!(
                "no such version on disk: {}/v{}",
                skill_id, version
            )));
        }
        let mut files = FileTree::new();
        collect_files(&version_dir, &version_dir, &mut files).await?;
        Ok(files)
    }

    async fn list_versions(&self, skill_id: &str) -> Result<Vec<u32>> {
        let skill_dir = self.root.join("skills").join(skill_id);
        if !skill_dir.exists() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        let mut entries = fs::read_dir(&skill_dir)
            .await
            .map_err(|e| Error::storage_unavailable(e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage_unavailable(e))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let key = format!("skills/{skill_id}/{name}/");
            if let Some(v) = version_from_key(skill_id, &key) {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    async fn delete_version(&self, skill_id: &str, version: u32) -> Result<()> {
        let version_dir = self.path_for_key(&version_prefix(skill_id, version));
        if version_dir.exists() {
            fs::remove_dir_all(&version_dir)
                .await
                .map_err(|e| Error::storage_unavailable(e))?;
        }
        Ok(())
    }

    async fn sync_all(&self, _local_cache_dir: &Path) -> Result<usize> {
        // The local backend already is the cache; nothing to mirror.
        Ok(0)
    }

    async fn put_latest(&self, skill_id: &str, pointer: &LatestPointer) -> Result<()> {
        let path = self.path_for_key(&latest_key(skill_id));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage_unavailable(e))?;
        }
        let body =
            serde_json::to_vec_pretty(pointer).map_err(|e| Error::internal(e.to_string()))?;
        fs::write(&path, body)
            .await
            .map_err(|e| Error::storage_unavailable(e))
    }

    async fn get_latest(&self, skill_id: &str) -> Result<Option<LatestPointer>> {
        let path = self.path_for_key(&latest_key(skill_id));
        match fs::read(&path).await {
            Ok(bytes) => {
                let pointer = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::internal(e.to_string()))?;
                Ok(Some(pointer))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage_unavailable(e)),
        }
    }
}

fn collect_files<'a>(
    root: &'a Path,
    dir: &'a Path,
    out: &'a mut FileTree,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| Error::storage_unavailable(e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage_unavailable(e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::storage_unavailable(e))?;
            if file_type.is_dir() {
                collect_files(root, &path, out).await?;
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .expect("walked path is under root")
                    .to_string_lossy()
                    .replace('\\', "/");
                let bytes = fs::read(&path).await.map_err(|e| Error::storage_unavailable(e))?;
                out.insert(relative, bytes);
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::FileTree;

    fn files(entries: &[(&str, &str)]) -> FileTree {
        entries
            .iter()
            .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
            .collect()
    }

    #[tokio::test]
    async fn put_then_get_version_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let tree = files(&[("SKILL.md", "---\nname: echo\n---\nhi"), ("references/foo.md", "bar")]);
        store.put_version("echo", 1, &tree).await.unwrap();
        let round_tripped = store.get_version("echo", 1).await.unwrap();
        assert_eq!(round_tripped, tree);
    }

    #[tokio::test]
    async fn list_versions_sorted_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.put_version("echo", 2, &files(&[("a", "x")])).await.unwrap();
        store.put_version("echo", 1, &files(&[("a", "x")])).await.unwrap();
        store.put_version("echo", 3, &files(&[("a", "x")])).await.unwrap();
        assert_eq!(store.list_versions("echo").await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn put_version_twice_is_rejected_versions_are_immutable() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let tree = files(&[("a", "x")]);
        store.put_version("echo", 1, &tree).await.unwrap();
        assert!(store.put_version("echo", 1, &tree).await.is_err());
    }

    #[tokio::test]
    async fn latest_pointer_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(store.get_latest("echo").await.unwrap().is_none());
        let pointer = LatestPointer {
            version: 1,
            published_at: chrono::Utc::now(),
        };
        store.put_latest("echo", &pointer).await.unwrap();
        let read_back = store.get_latest("echo").await.unwrap().unwrap();
        assert_eq!(read_back.version, 1);
    }

    #[tokio::test]
    async fn delete_version_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.put_version("echo", 1, &files(&[("a", "x")])).await.unwrap();
        store.delete_version("echo", 1).await.unwrap();
        assert!(store.list_versions("echo").await.unwrap().is_empty());
    }
}
