use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use skillforge_types::{Result, SkillStatus};
use std::time::Duration;

use crate::metadata_store::{MetadataStore, SkillMetadataRow};
use crate::sqlite::SqliteHandle;

pub struct LocalMetadataStore {
    db: SqliteHandle,
}

impl LocalMetadataStore {
    pub fn new(db: SqliteHandle) -> Self {
        Self { db }
    }
}

fn status_to_str(status: SkillStatus) -> &'static str {
    match status {
        SkillStatus::Draft => "draft",
        SkillStatus::Active => "active",
        SkillStatus::Inactive => "inactive",
        SkillStatus::Error => "error",
    }
}

fn status_from_str(s: &str) -> SkillStatus {
    match s {
        "active" => SkillStatus::Active,
        "inactive" => SkillStatus::Inactive,
        "error" => SkillStatus::Error,
        _ => SkillStatus::Draft,
    }
}

fn row_from_sqlite(row: &rusqlite::Row<'_>) -> rusqlite::Result<SkillMetadataRow> {
    let status: String = row.get("status")?;
    let all_versions: String = row.get("all_versions")?;
    let last_invoked_at: Option<String> = row.get("last_invoked_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(SkillMetadataRow {
        skill_id: row.get("skill_id")?,
        status: status_from_str(&status),
        active_version: row.get::<_, i64>("active_version")? as u32,
        all_versions: serde_json::from_str(&all_versions).unwrap_or_default(),
        invocation_count: row.get::<_, i64>("invocation_count")? as u64,
        last_invoked_at: last_invoked_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .unwrap_or_else(|_| Utc::now().into())
            .with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .unwrap_or_else(|_| Utc::now().into())
            .with_timezone(&Utc),
    })
}

#[async_trait]
impl MetadataStore for LocalMetadataStore {
    async fn put(&self, row: SkillMetadataRow) -> Result<()> {
        let all_versions = serde_json::to_string(&row.all_versions)
            .map_err(|e| skillforge_types::Error::internal(e.to_string()))?;
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO skill_metadata
                        (skill_id, status, active_version, all_versions, invocation_count,
                         last_invoked_at, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(skill_id) DO UPDATE SET
                        status = excluded.status,
                        active_version = excluded.active_version,
                        all_versions = excluded.all_versions,
                        invocation_count = excluded.invocation_count,
                        last_invoked_at = excluded.last_invoked_at,
                        updated_at = excluded.updated_at",
                    params![
                        row.skill_id,
                        status_to_str(row.status),
                        row.active_version,
                        all_versions,
                        row.invocation_count as i64,
                        row.last_invoked_at.map(|t| t.to_rfc3339()),
                        row.created_at.to_rfc3339(),
                        row.updated_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn get(&self, skill_id: &str) -> Result<Option<SkillMetadataRow>> {
        let skill_id = skill_id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT * FROM skill_metadata WHERE skill_id = ?1",
                    params![skill_id],
                    row_from_sqlite,
                )
                .optional()
            })
            .await
    }

    async fn list(&self, status: Option<SkillStatus>) -> Result<Vec<SkillMetadataRow>> {
        self.db
            .with_conn(move |conn| {
                let mut rows = Vec::new();
                if let Some(status) = status {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM skill_metadata WHERE status = ?1 ORDER BY updated_at",
                    )?;
                    let mapped = stmt.query_map(params![status_to_str(status)], row_from_sqlite)?;
                    for r in mapped {
                        rows.push(r?);
                    }
                } else {
                    let mut stmt =
                        conn.prepare("SELECT * FROM skill_metadata ORDER BY updated_at")?;
                    let mapped = stmt.query_map([], row_from_sqlite)?;
                    for r in mapped {
                        rows.push(r?);
                    }
                }
                Ok(rows)
            })
            .await
    }

    async fn delete(&self, skill_id: &str) -> Result<()> {
        let skill_id = skill_id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.execute("DELETE FROM skill_metadata WHERE skill_id = ?1", params![skill_id])?;
                Ok(())
            })
            .await
    }

    async fn increment_invocation(&self, skill_id: &str, at: DateTime<Utc>) {
        const MAX_ATTEMPTS: u32 = 3;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let skill_id_owned = skill_id.to_string();
            let at_owned = at;
            let outcome = self
                .db
                .with_conn(move |conn| {
                    conn.execute(
                        "UPDATE skill_metadata
                         SET invocation_count = invocation_count + 1, last_invoked_at = ?1, updated_at = ?1
                         WHERE skill_id = ?2",
                        params![at_owned.to_rfc3339(), skill_id_owned],
                    )?;
                    Ok(())
                })
                .await;
            match outcome {
                Ok(()) => return,
                Err(_) if attempt < MAX_ATTEMPTS => {
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
                Err(e) => {
                    tracing::warn!(skill_id, attempts = attempt, error = %e, "dropping invocation counter increment after exhausting retries");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(skill_id: &str) -> SkillMetadataRow {
        let now = Utc::now();
        SkillMetadataRow {
            skill_id: skill_id.to_string(),
            status: SkillStatus::Active,
            active_version: 1,
            all_versions: vec![1],
            invocation_count: 0,
            last_invoked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = LocalMetadataStore::new(SqliteHandle::open_in_memory().unwrap());
        store.put(sample_row("echo")).await.unwrap();
        let fetched = store.get("echo").await.unwrap().unwrap();
        assert_eq!(fetched.active_version, 1);
        assert_eq!(fetched.all_versions, vec![1]);
    }

    #[tokio::test]
    async fn get_unknown_skill_is_none() {
        let store = LocalMetadataStore::new(SqliteHandle::open_in_memory().unwrap());
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = LocalMetadataStore::new(SqliteHandle::open_in_memory().unwrap());
        let mut inactive = sample_row("retired");
        inactive.status = SkillStatus::Inactive;
        store.put(sample_row("echo")).await.unwrap();
        store.put(inactive).await.unwrap();
        let active = store.list(Some(SkillStatus::Active)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].skill_id, "echo");
    }

    #[tokio::test]
    async fn increment_invocation_is_atomic_add() {
        let store = LocalMetadataStore::new(SqliteHandle::open_in_memory().unwrap());
        store.put(sample_row("echo")).await.unwrap();
        store.increment_invocation("echo", Utc::now()).await;
        store.increment_invocation("echo", Utc::now()).await;
        let fetched = store.get("echo").await.unwrap().unwrap();
        assert_eq!(fetched.invocation_count, 2);
        assert!(fetched.last_invoked_at.is_some());
    }

    #[tokio::test]
    async fn increment_invocation_on_missing_row_is_silently_dropped() {
        let store = LocalMetadataStore::new(SqliteHandle::open_in_memory().unwrap());
        store.increment_invocation("nope", Utc::now()).await;
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let store = LocalMetadataStore::new(SqliteHandle::open_in_memory().unwrap());
        store.put(sample_row("echo")).await.unwrap();
        store.delete("echo").await.unwrap();
        assert!(store.get("echo").await.unwrap().is_none());
    }
}
