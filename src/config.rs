//! Configuration for connection-engine

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("connection-engine")
}

/// Business rules that deployments may tune
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipPolicy {
    /// Permit a fresh request (either direction) after a decline
    #[serde(default = "default_true")]
    pub allow_resend_after_decline: bool,

    /// Owners and admins may not follow their own organization
    #[serde(default = "default_true")]
    pub forbid_admin_self_follow: bool,
}

impl Default for RelationshipPolicy {
    fn default() -> Self {
        Self {
            allow_resend_after_decline: true,
            forbid_admin_self_follow: true,
        }
    }
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the relationship database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Address the HTTP API binds to
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Maximum pooled SQLite connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a connection waits on the SQLite write lock
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Upper bound on a single API call, including the store round-trip
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Relationship rules
    #[serde(default)]
    pub policy: RelationshipPolicy,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8095
}

fn default_pool_size() -> u32 {
    8
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            bind_host: default_bind_host(),
            http_port: default_http_port(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            policy: RelationshipPolicy::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get relationship database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join("relationships.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("http_port = 9000\n").unwrap();
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.pool_size, 8);
        assert!(config.policy.allow_resend_after_decline);
        assert!(config.policy.forbid_admin_self_follow);
    }

    #[test]
    fn test_policy_section() {
        let config: Config = toml::from_str(
            "[policy]\nallow_resend_after_decline = false\n",
        )
        .unwrap();
        assert!(!config.policy.allow_resend_after_decline);
        assert!(config.policy.forbid_admin_self_follow);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.request_timeout_ms = 2_500;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.request_timeout_ms, 2_500);
        assert_eq!(loaded.policy, RelationshipPolicy::default());
    }
}
