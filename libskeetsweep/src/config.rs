//! Configuration management for Skeetsweep

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::retention::RetentionPolicy;

/// Largest page the XRPC list endpoints accept
pub const MAX_PAGE_SIZE: u32 = 100;

/// Largest number of writes accepted by a single `applyWrites` call
pub const MAX_BATCH_SIZE: usize = 200;

pub const DEFAULT_PDS_URL: &str = "https://bsky.social";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub account: AccountConfig,
    pub service: ServiceConfig,
    pub retention: RetentionConfig,
    pub deletion: DeletionConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Handle or DID used to create the session
    pub handle: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub pds_url: String,
    pub page_size: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            pds_url: DEFAULT_PDS_URL.to_string(),
            page_size: MAX_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub min_likes: Option<u64>,
    pub min_reposts: Option<u64>,
    pub protect_threads: bool,
    pub protect_self_liked: bool,
    /// Posts and reposts strictly before this day lose date protection
    pub delete_before: Option<NaiveDate>,
    /// Relative alternative to `delete_before`
    pub keep_days: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// One `deleteRecord` call per record
    Single,
    /// `applyWrites` calls carrying up to `batch_size` deletes
    Batch,
}

impl std::str::FromStr for DeleteMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(DeleteMode::Single),
            "batch" => Ok(DeleteMode::Batch),
            _ => Err(format!(
                "Invalid delete mode: '{}'. Valid options: single, batch",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionConfig {
    pub post_mode: DeleteMode,
    pub repost_mode: DeleteMode,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            post_mode: DeleteMode::Single,
            repost_mode: DeleteMode::Batch,
            batch_size: MAX_BATCH_SIZE,
            max_attempts: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file at the default location yields the default
    /// configuration; a path set through `SKEETSWEEP_CONFIG` must exist.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var("SKEETSWEEP_CONFIG").is_ok();
        let config_path = resolve_config_path()?;
        if !explicit && !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.service.page_size == 0 || self.service.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "service.page_size must be between 1 and {} (got {})",
                MAX_PAGE_SIZE, self.service.page_size
            ))
            .into());
        }
        if self.deletion.batch_size == 0 || self.deletion.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid(format!(
                "deletion.batch_size must be between 1 and {} (got {})",
                MAX_BATCH_SIZE, self.deletion.batch_size
            ))
            .into());
        }
        if self.deletion.max_attempts == 0 {
            return Err(
                ConfigError::Invalid("deletion.max_attempts must be at least 1".to_string()).into(),
            );
        }
        if self.retention.delete_before.is_some() && self.retention.keep_days.is_some() {
            return Err(ConfigError::Invalid(
                "retention.delete_before and retention.keep_days are mutually exclusive"
                    .to_string(),
            )
            .into());
        }
        url::Url::parse(&self.service.pds_url).map_err(|e| {
            ConfigError::Invalid(format!(
                "service.pds_url '{}' is not a valid URL: {}",
                self.service.pds_url, e
            ))
        })?;
        Ok(())
    }

    /// The account handle, or an error naming the missing field
    pub fn handle(&self) -> Result<&str> {
        self.account
            .handle
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField("account.handle".to_string()).into())
    }

    /// Build the retention policy described by the `[retention]` table
    ///
    /// `keep_days` is resolved against `today`.
    pub fn retention_policy(&self, today: NaiveDate) -> RetentionPolicy {
        let retention = &self.retention;
        let date_cutoff = retention.delete_before.or_else(|| {
            retention
                .keep_days
                .and_then(|days| today.checked_sub_days(chrono::Days::new(days as u64)))
        });

        RetentionPolicy {
            min_likes: retention.min_likes,
            min_reposts: retention.min_reposts,
            protect_threads: retention.protect_threads,
            protect_self_liked: retention.protect_self_liked,
            date_cutoff,
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SKEETSWEEP_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("skeetsweep").join("config.toml"))
}
