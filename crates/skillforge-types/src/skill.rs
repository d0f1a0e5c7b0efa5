use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Validates a skill id against `^[a-z][a-z0-9-]{2,49}$`: a lowercase letter
/// followed by 2-49 lowercase alphanumerics or hyphens (3-50 chars total).
pub fn validate_skill_id(id: &str) -> Result<()> {
    let mut chars = id.chars();
    let first_ok = matches!(chars.next(), Some(c) if c.is_ascii_lowercase());
    let rest: Vec<char> = chars.collect();
    let rest_ok = (2..=49).contains(&rest.len())
        && rest
            .iter()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-');
    if first_ok && rest_ok {
        Ok(())
    } else {
        Err(Error::InvalidSkillId(id.to_string()))
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillMetadata {
    #[serde(default)]
    pub author: Option<String>,
    /// Author-facing display version, distinct from the monotonic integer
    /// `version` that identifies the stored bundle.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Parsed and validated `SKILL.md` front matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillManifest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default = "default_true")]
    pub user_invocable: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub metadata: SkillMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the skill's root, using forward slashes.
    pub path: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillFiles {
    pub scripts: Vec<FileEntry>,
    pub references: Vec<FileEntry>,
    pub assets: Vec<FileEntry>,
}

impl SkillFiles {
    pub fn total_bytes(&self) -> u64 {
        self.scripts
            .iter()
            .chain(self.references.iter())
            .chain(self.assets.iter())
            .map(|f| f.size_bytes)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.references.is_empty() && self.assets.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillStatus {
    Draft,
    Active,
    Inactive,
    Error,
}

impl std::fmt::Display for SkillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkillStatus::Draft => "draft",
            SkillStatus::Active => "active",
            SkillStatus::Inactive => "inactive",
            SkillStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// An immutable-per-version bundle: a specific (id, version) pair never
/// changes its manifest, instructions or files once stored. A new upload of
/// the same id is a new version, never an in-place edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub version: u32,
    pub manifest: SkillManifest,
    pub instructions: String,
    pub files: SkillFiles,
    pub status: SkillStatus,
    pub load_error: Option<String>,
    pub invocation_count: u64,
    pub last_invoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Skill {
    pub fn version_label(&self) -> String {
        format!("v{}", self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_skill_ids() {
        assert!(validate_skill_id("a-b").is_ok());
        assert!(validate_skill_id("pdf-extract").is_ok());
        assert!(validate_skill_id("echo").is_ok());
    }

    #[test]
    fn rejects_bad_skill_ids() {
        assert!(validate_skill_id("a1").is_err(), "too short (<3 chars)");
        assert!(validate_skill_id("Ab").is_err(), "uppercase not allowed");
        assert!(validate_skill_id("").is_err());
        assert!(validate_skill_id("1abc").is_err(), "must start with a letter");
        assert!(validate_skill_id("has_underscore").is_err());
        assert!(validate_skill_id(&"a".repeat(51)).is_err(), "too long");
    }

    #[test]
    fn version_label_formats_with_v_prefix() {
        let skill = Skill {
            id: "echo".into(),
            version: 3,
            manifest: SkillManifest {
                name: "echo".into(),
                description: "echoes input".into(),
                license: None,
                allowed_tools: vec![],
                user_invocable: true,
                model: None,
                context: None,
                metadata: SkillMetadata::default(),
            },
            instructions: String::new(),
            files: SkillFiles::default(),
            status: SkillStatus::Active,
            load_error: None,
            invocation_count: 0,
            last_invoked_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(skill.version_label(), "v3");
    }
}
