//! Object-store key layout shared by both `ObjectStore` backends:
//! `skills/{id}/v{n}/<relative-path>` plus a per-skill `latest.json`
//! commit-pointer object.

pub fn version_prefix(skill_id: &str, version: u32) -> String {
    format!("skills/{skill_id}/v{version}/")
}

pub fn object_key(skill_id: &str, version: u32, relative_path: &str) -> String {
    format!("{}{}", version_prefix(skill_id, version), relative_path)
}

pub fn latest_key(skill_id: &str) -> String {
    format!("skills/{skill_id}/latest.json")
}

pub fn skill_prefix(skill_id: &str) -> String {
    format!("skills/{skill_id}/")
}

/// Extracts the `v{n}` path segment out of a full object key, used when
/// turning a prefix listing back into a sorted set of version numbers.
pub fn version_from_key(skill_id: &str, key: &str) -> Option<u32> {
    let prefix = skill_prefix(skill_id);
    let rest = key.strip_prefix(&prefix)?;
    let segment = rest.split('/').next()?;
    let digits = segment.strip_prefix('v')?;
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_version_from_key() {
        let key = object_key("echo", 3, "references/foo.md");
        assert_eq!(key, "skills/echo/v3/references/foo.md");
        assert_eq!(version_from_key("echo", &key), Some(3));
    }

    #[test]
    fn latest_key_is_outside_any_version_prefix() {
        let latest = latest_key("echo");
        assert_eq!(latest, "skills/echo/latest.json");
        assert_eq!(version_from_key("echo", &latest), None);
    }
}
