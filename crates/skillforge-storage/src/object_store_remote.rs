use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use skillforge_types::{Error, Result};
use std::path::Path;
use std::time::Duration;

use crate::keys::{latest_key, object_key, version_prefix};
use crate::object_store::{FileTree, LatestPointer, ObjectStore};

/// `remote` backend: speaks a minimal S3-compatible HTTP surface
/// (`PUT`/`GET`/`DELETE`/prefix-`LIST`) over `reqwest`. Selected by
/// `STORAGE_BACKEND=remote`.
pub struct RemoteObjectStore {
    client: Client,
    base_url: String,
    bucket: String,
    prefix: String,
}

impl RemoteObjectStore {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client with a static, valid config always builds");
        Self {
            client,
            base_url: base_url.into(),
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    fn url_for_key(&self, key: &str) -> String {
        format!(
            "{}/{}/{}{}",
            self.base_url.trim_end_matches('/'),
            self.bucket,
            self.prefix,
            key
        )
    }

    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let resp = self
            .client
            .put(self.url_for_key(key))
            .body(bytes)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::storage_unavailable(format!(
                "PUT {key} returned {}",
                resp.status()
            )))
        }
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let resp = self.client.get(self.url_for_key(key)).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(resp.bytes().await?.to_vec())),
            s => Err(Error::storage_unavailable(format!("GET {key} returned {s}"))),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let resp = self.client.delete(self.url_for_key(key)).send().await?;
        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Error::storage_unavailable(format!(
                "DELETE {key} returned {}",
                resp.status()
            )))
        }
    }

    /// Lists object keys under `prefix` via the bucket's `?list-type=2&prefix=`
    /// query surface, returning bare relative paths under that prefix.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/{}?list-type=2&prefix={}{}",
            self.base_url.trim_end_matches('/'),
            self.bucket,
            self.prefix,
            prefix
        );
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::storage_unavailable(format!(
                "LIST {prefix} returned {}",
                resp.status()
            )));
        }
        let body: ListResponse = resp.json().await?;
        Ok(body
            .keys
            .into_iter()
            .map(|k| k.trim_start_matches(&self.prefix).to_string())
            .collect())
    }
}

#[derive(serde::Deserialize)]
struct ListResponse {
    #[serde(default)]
    keys: Vec<String>,
}

#[async_trait]
impl ObjectStore for RemoteObjectStore {
    async fn put_version(&self, skill_id: &str, version: u32, files: &FileTree) -> Result<String> {
        let prefix = version_prefix(skill_id, version);
        for (relative_path, bytes) in files {
            let key = object_key(skill_id, version, relative_path);
            self.put_object(&key, bytes.clone()).await?;
        }
        Ok(prefix)
    }

    async fn get_version(&self, skill_id: &str, version: u32) -> Result<FileTree> {
        let prefix = version_prefix(skill_id, version);
        let keys = self.list_prefix(&prefix).await?;
        let mut files = FileTree::new();
        for key in keys {
            let full_key = format!("{prefix}{key}");
            if let Some(bytes) = self.get_object(&full_key).await? {
                files.insert(key, bytes);
            }
        }
        Ok(files)
    }

    async fn list_versions(&self, skill_id: &str) -> Result<Vec<u32>> {
        let keys = self.list_prefix(&format!("skills/{skill_id}/")).await?;
        let mut versions: Vec<u32> = keys
            .iter()
            .filter_map(|k| crate::keys::version_from_key(skill_id, &format!("skills/{skill_id}/{k}")))
            .collect();
        versions.sort_unstable();
        versions.dedup();
        Ok(versions)
    }

    async fn delete_version(&self, skill_id: &str, version: u32) -> Result<()> {
        let prefix = version_prefix(skill_id, version);
        let keys = self.list_prefix(&prefix).await?;
        for key in keys {
            self.delete_object(&format!("{prefix}{key}")).await?;
        }
        Ok(())
    }

    async fn sync_all(&self, local_cache_dir: &Path) -> Result<usize> {
        let keys = self.list_prefix("skills/").await?;
        let mut count = 0;
        for key in keys {
            let full_key = format!("skills/{key}");
            if let Some(bytes) = self.get_object(&full_key).await? {
                let dest = local_cache_dir.join(&full_key);
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| Error::storage_unavailable(e))?;
                }
                tokio::fs::write(&dest, bytes)
                    .await
                    .map_err(|e| Error::storage_unavailable(e))?;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn put_latest(&self, skill_id: &str, pointer: &LatestPointer) -> Result<()> {
        let body = serde_json::to_vec(pointer).map_err(|e| Error::internal(e.to_string()))?;
        self.put_object(&latest_key(skill_id), body).await
    }

    async fn get_latest(&self, skill_id: &str) -> Result<Option<LatestPointer>> {
        match self.get_object(&latest_key(skill_id)).await? {
            Some(bytes) => {
                let pointer = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::internal(e.to_string()))?;
                Ok(Some(pointer))
            }
            None => Ok(None),
        }
    }
}
