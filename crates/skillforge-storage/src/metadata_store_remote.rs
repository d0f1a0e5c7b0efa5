use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use skillforge_types::{Error, Result, SkillStatus};
use std::time::Duration;

use crate::metadata_store::{MetadataStore, SkillMetadataRow};

/// `remote` backend: the metadata table lives behind an HTTP surface with
/// conditional-update semantics (e.g. a DynamoDB-style table behind a thin
/// proxy). Unlike the local SQLite backend, a single `UPDATE` statement
/// cannot express the atomic increment, so contention across replicas is
/// expected here and the bounded-retry wrapper in `increment_invocation`
/// does real work.
pub struct RemoteMetadataStore {
    client: Client,
    base_url: String,
    table: String,
}

impl RemoteMetadataStore {
    pub fn new(base_url: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client with a static, valid config always builds"),
            base_url: base_url.into(),
            table: table.into(),
        }
    }

    fn item_url(&self, skill_id: &str) -> String {
        format!(
            "{}/{}/items/{}",
            self.base_url.trim_end_matches('/'),
            self.table,
            skill_id
        )
    }
}

#[async_trait]
impl MetadataStore for RemoteMetadataStore {
    async fn put(&self, row: SkillMetadataRow) -> Result<()> {
        let resp = self
            .client
            .put(self.item_url(&row.skill_id))
            .json(&row)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::storage_unavailable(format!(
                "PUT metadata item returned {}",
                resp.status()
            )))
        }
    }

    async fn get(&self, skill_id: &str) -> Result<Option<SkillMetadataRow>> {
        let resp = self.client.get(self.item_url(skill_id)).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(resp.json().await?)),
            s => Err(Error::storage_unavailable(format!(
                "GET metadata item returned {s}"
            ))),
        }
    }

    async fn list(&self, status: Option<SkillStatus>) -> Result<Vec<SkillMetadataRow>> {
        let mut url = format!(
            "{}/{}/items",
            self.base_url.trim_end_matches('/'),
            self.table
        );
        if let Some(status) = status {
            url = format!("{url}?status={status}");
        }
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::storage_unavailable(format!(
                "LIST metadata returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    async fn delete(&self, skill_id: &str) -> Result<()> {
        let resp = self.client.delete(self.item_url(skill_id)).send().await?;
        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Error::storage_unavailable(format!(
                "DELETE metadata item returned {}",
                resp.status()
            )))
        }
    }

    async fn increment_invocation(&self, skill_id: &str, at: DateTime<Utc>) {
        const MAX_ATTEMPTS: u32 = 3;
        let body = serde_json::json!({ "op": "increment_invocation_count", "last_invoked_at": at });
        for attempt in 1..=MAX_ATTEMPTS {
            let resp = self
                .client
                .post(format!("{}/update", self.item_url(skill_id)))
                .json(&body)
                .send()
                .await;
            match resp {
                Ok(r) if r.status().is_success() => return,
                _ if attempt < MAX_ATTEMPTS => {
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
                _ => {
                    tracing::warn!(skill_id, attempts = attempt, "dropping invocation counter increment after exhausting retries against remote metadata store");
                }
            }
        }
    }
}
