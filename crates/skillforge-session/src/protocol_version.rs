/// Protocol versions the server supports, newest first. `initialize`
/// negotiates the highest version present in both this list and the
/// client's offered list.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-11-25", "2025-06-18", "2025-03-26"];

/// Picks the highest-priority protocol version the server and client both
/// support. `client_versions` may list them in any order; server priority
/// (newest first) always wins ties.
pub fn negotiate(client_versions: &[String]) -> Option<String> {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|server_version| client_versions.iter().any(|v| v == *server_version))
        .map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_newest_mutually_supported_version() {
        let client = vec!["2025-03-26".to_string(), "2025-06-18".to_string()];
        assert_eq!(negotiate(&client).as_deref(), Some("2025-06-18"));
    }

    #[test]
    fn falls_back_to_oldest_supported_version() {
        let client = vec!["2025-03-26".to_string()];
        assert_eq!(negotiate(&client).as_deref(), Some("2025-03-26"));
    }

    #[test]
    fn returns_none_when_no_common_version() {
        let client = vec!["2024-11-05".to_string()];
        assert_eq!(negotiate(&client), None);
    }
}
