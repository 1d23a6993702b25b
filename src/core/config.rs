//! `config.toml` under the data directory.
//!
//! Only the CLI reads configuration; library components take explicit values.

use crate::core::error::StarlogError;
use crate::core::resolver::{DEFAULT_EXTERNAL_TIMEOUT_MS, DEFAULT_MAX_DEPTH, ResolverOptions};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_ACTOR: &str = "starlog";
pub const DEFAULT_RECENT_DIARY_ENTRIES: usize = 3;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ResolutionConfig {
    pub max_depth: usize,
    pub external_timeout_ms: u64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            external_timeout_ms: DEFAULT_EXTERNAL_TIMEOUT_MS,
        }
    }
}

impl From<&ResolutionConfig> for ResolverOptions {
    fn from(c: &ResolutionConfig) -> Self {
        ResolverOptions {
            max_depth: c.max_depth,
            external_timeout: Duration::from_millis(c.external_timeout_ms),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ContextConfig {
    pub recent_diary_entries: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            recent_diary_entries: DEFAULT_RECENT_DIARY_ENTRIES,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StarlogConfig {
    pub actor: Option<String>,
    pub resolution: ResolutionConfig,
    pub context: ContextConfig,
    #[serde(skip)]
    pub data_dir: PathBuf,
}

impl StarlogConfig {
    pub fn actor(&self) -> String {
        env::var("STARLOG_ACTOR")
            .ok()
            .filter(|a| !a.trim().is_empty())
            .or_else(|| self.actor.clone())
            .unwrap_or_else(|| DEFAULT_ACTOR.to_string())
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions::from(&self.resolution)
    }

    fn validate(&self) -> Result<(), StarlogError> {
        if self.resolution.max_depth == 0 {
            return Err(StarlogError::InvalidArgument(
                "resolution.max_depth must be at least 1".to_string(),
            ));
        }
        if self.resolution.external_timeout_ms == 0 {
            return Err(StarlogError::InvalidArgument(
                "resolution.external_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// `$STARLOG_DATA_DIR`, else `~/.starlog/data`, else `./.starlog/data`.
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = env::var_os("STARLOG_DATA_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".starlog")
        .join("data")
}

/// Load `<data_dir>/config.toml`; a missing file yields defaults.
pub fn load_config(data_dir: &Path) -> Result<StarlogConfig, StarlogError> {
    let path = data_dir.join(CONFIG_FILE);
    let mut config = if path.exists() {
        let content = fs::read_to_string(&path)?;
        toml::from_str::<StarlogConfig>(&content)?
    } else {
        StarlogConfig::default()
    };
    config.data_dir = data_dir.to_path_buf();
    config.validate()?;
    Ok(config)
}
