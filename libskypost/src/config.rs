//! Configuration management for Skypost

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

pub const DEFAULT_DOMAIN: &str = "https://bsky.social";
pub const DEFAULT_MAX_BYTES: usize = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bluesky: BlueskyConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub posts: PostsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub identifier: String,
    /// Upper bound on the published text, in UTF-8 bytes
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    /// Attach an `app.bsky.embed.external` card pointing at the short link
    #[serde(default)]
    pub link_card: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostsConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// humantime duration, e.g. "7days" or "12h"
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_max_bytes() -> usize {
    DEFAULT_MAX_BYTES
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_refresh_interval() -> String {
    "7days".to_string()
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            identifier: String::new(),
            max_bytes: default_max_bytes(),
            link_card: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: "~/.config/skypost/session.toml".to_string(),
        }
    }
}

impl Default for PostsConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/skypost/posts".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/skypost/history.db".to_string(),
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
        }
    }
}

impl BlueskyConfig {
    /// Domain with any trailing slashes removed, ready for endpoint paths
    pub fn normalized_domain(&self) -> String {
        normalize_domain(&self.domain)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SchedulingConfig {
    /// Parse the refresh interval
    pub fn refresh_interval(&self) -> Result<Duration> {
        crate::scheduling::parse_interval(&self.refresh_interval).map_err(|reason| {
            ConfigError::InvalidValue {
                field: "scheduling.refresh_interval".to_string(),
                reason,
            }
            .into()
        })
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            bluesky: BlueskyConfig::default(),
            session: SessionConfig::default(),
            posts: PostsConfig::default(),
            database: DatabaseConfig::default(),
            scheduling: SchedulingConfig::default(),
        }
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        let domain = self.bluesky.normalized_domain();
        if domain.is_empty() {
            return Err(ConfigError::MissingField("bluesky.domain".to_string()).into());
        }
        if !domain.starts_with("http://") && !domain.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "bluesky.domain".to_string(),
                reason: format!("'{}' must start with http:// or https://", domain),
            }
            .into());
        }
        if self.bluesky.max_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "bluesky.max_bytes".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        self.scheduling.refresh_interval()?;
        Ok(())
    }
}

/// Trim trailing slashes so `{domain}/xrpc/...` never doubles them
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('/').to_string()
}

/// Expand `~` in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SKYPOST_CONFIG") {
        return Ok(expand_path(&path));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("skypost").join("config.toml"))
}
