// SPDX-License-Identifier: MIT

//! Configuration for the admission filter.
//!
//! Defaults reproduce the reference policy: 60 requests per minute per
//! client, a 30-minute eviction sweep, a 2-hour blocklist refresh and a
//! 3-second delay before answering a rate-limited request.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Blocklist configuration
    #[serde(default)]
    pub blocklist: BlocklistConfig,
}

/// Per-client quota configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per interval per client (default: 60)
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Quota interval in seconds (default: 60)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Delay before answering a rate-limited request, in milliseconds
    /// (default: 3000). Applied on the deny path only.
    #[serde(default = "default_deny_delay_ms")]
    pub deny_delay_ms: u64,

    /// Period of the stale-entry eviction sweep in seconds (default: 1800)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Blocklist source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocklistConfig {
    /// File holding blocked-path patterns, one regex per line
    #[serde(default = "default_paths_file")]
    pub paths_file: PathBuf,

    /// File holding blocked-user-agent patterns, one regex per line
    #[serde(default = "default_user_agents_file")]
    pub user_agents_file: PathBuf,

    /// Period of the blocklist reload in seconds (default: 7200)
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_limit() -> u32 {
    60
}

fn default_interval_secs() -> u64 {
    60
}

fn default_deny_delay_ms() -> u64 {
    3000
}

fn default_sweep_interval_secs() -> u64 {
    1800 // 30 minutes
}

fn default_paths_file() -> PathBuf {
    PathBuf::from("data/blocked_paths.txt")
}

fn default_user_agents_file() -> PathBuf {
    PathBuf::from("data/blocked_ua.txt")
}

fn default_refresh_interval_secs() -> u64 {
    7200 // 2 hours
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            rate_limit: RateLimitConfig::default(),
            blocklist: BlocklistConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            interval_secs: default_interval_secs(),
            deny_delay_ms: default_deny_delay_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            paths_file: default_paths_file(),
            user_agents_file: default_user_agents_file(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        let config = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Resolve configuration from `ADMISSION_CONFIG` (default: `config.toml`).
    ///
    /// A missing file yields the built-in defaults; an unreadable or invalid
    /// file is an error.
    pub fn from_env_or_default() -> anyhow::Result<Self> {
        let path = PathBuf::from(
            std::env::var("ADMISSION_CONFIG").unwrap_or_else(|_| "config.toml".into()),
        );
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

impl RateLimitConfig {
    /// Get the quota interval
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Get the deny-path delay
    pub fn deny_delay(&self) -> Duration {
        Duration::from_millis(self.deny_delay_ms)
    }

    /// Get the eviction sweep period
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl BlocklistConfig {
    /// Get the reload period
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_policy() {
        let config = Config::default();
        assert_eq!(config.rate_limit.limit, 60);
        assert_eq!(config.rate_limit.interval(), Duration::from_secs(60));
        assert_eq!(config.rate_limit.deny_delay(), Duration::from_millis(3000));
        assert_eq!(config.rate_limit.sweep_interval(), Duration::from_secs(1800));
        assert_eq!(config.blocklist.refresh_interval(), Duration::from_secs(7200));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            bind_addr = "127.0.0.1:9000"

            [rate_limit]
            limit = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.rate_limit.limit, 10);
        assert_eq!(config.rate_limit.interval_secs, 60);
        assert_eq!(
            config.blocklist.paths_file,
            PathBuf::from("data/blocked_paths.txt")
        );
    }
}
