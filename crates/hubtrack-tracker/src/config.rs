//! Tracker configuration
//!
//! Stored in `~/.config/hubtrack/config.yaml`:
//!
//! ```yaml
//! concurrency: 10
//! bypassDigestCheck: false
//! githubToken: ghp_xxx
//! githubRateLimit:
//!   requestsPerHour: 5000
//!   burst: 25
//! httpTimeoutSecs: 30
//! imagesDir: /var/lib/hubtrack/images
//! ```

use hubtrack_repo::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TrackerError};

/// Default number of chart versions prepared concurrently
pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Enrich every version, even when its digest is unchanged
    #[serde(default)]
    pub bypass_digest_check: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,

    #[serde(default)]
    pub github_rate_limit: RateLimitConfig,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Where logos are stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images_dir: Option<PathBuf>,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            bypass_digest_check: false,
            github_token: None,
            github_rate_limit: RateLimitConfig::default(),
            http_timeout_secs: default_http_timeout_secs(),
            images_dir: None,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from the default location, if it exists
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| TrackerError::InvalidConfig {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hubtrack").join("config.yaml"))
    }

    /// Default logo directory
    pub fn default_images_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("hubtrack")
            .join("images")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.images_dir
            .clone()
            .unwrap_or_else(Self::default_images_dir)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Concurrency, never below one worker
    pub fn workers(&self) -> usize {
        self.concurrency.max(1)
    }
}
