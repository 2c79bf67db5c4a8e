//! Configuration for the content store.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CONTENT_STORE_ROOT, CONTENT_STORE_MAX_ID_ATTEMPTS)
//! 2. Config file (.content-store/config.yaml)
//! 3. Defaults (~/.content-store/content, 5 id attempts)
//!
//! Config file discovery:
//! - Searches current directory and parents for .content-store/config.yaml
//! - Paths in config file are relative to the directory holding .content-store/

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::MAX_CONTENT_ID;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

pub const ENV_ROOT: &str = "CONTENT_STORE_ROOT";
pub const ENV_MAX_ID_ATTEMPTS: &str = "CONTENT_STORE_MAX_ID_ATTEMPTS";

/// Attempts at drawing a free random id before giving up
pub const DEFAULT_MAX_ID_ATTEMPTS: u32 = 5;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Content root directory (relative to the project directory)
    pub root: Option<String>,
    pub max_id_attempts: Option<u32>,
    /// Upper bound of the random id range
    pub max_id: Option<u64>,
}

/// Settings a [`crate::ContentStore`] is built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Directory holding one subdirectory per content id
    pub root: PathBuf,

    /// Random id draws before failing with id exhaustion
    pub max_id_attempts: u32,

    /// Ids are drawn from `[1, max_id]`
    pub max_id: u64,
}

impl StoreSettings {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_id_attempts: DEFAULT_MAX_ID_ATTEMPTS,
            max_id: MAX_CONTENT_ID,
        }
    }

    pub fn with_max_id_attempts(mut self, attempts: u32) -> Self {
        self.max_id_attempts = attempts.max(1);
        self
    }

    /// Shrink the id space, clamped to `[1, 2^32]`
    pub fn with_max_id(mut self, max_id: u64) -> Self {
        self.max_id = max_id.clamp(1, MAX_CONTENT_ID);
        self
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub store: StoreSettings,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".content-store").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the project directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

fn default_root() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".content-store")
        .join("content"))
}

/// Merge a config file (if any) with environment overrides
fn resolve<F>(config_file: Option<PathBuf>, env: F) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let (file_root, file_attempts, file_max_id) = match config_file {
        Some(ref config_path) => {
            let config = load_config_file(config_path)?;

            // Project directory is the parent of .content-store/
            let base_dir = config_path
                .parent()
                .and_then(|p| p.parent())
                .unwrap_or(Path::new("."));

            (
                config.store.root.map(|root| resolve_path(base_dir, &root)),
                config.store.max_id_attempts,
                config.store.max_id,
            )
        }
        None => (None, None, None),
    };

    let root = match env(ENV_ROOT) {
        Some(env_root) => PathBuf::from(env_root),
        None => match file_root {
            Some(root) => root,
            None => default_root()?,
        },
    };

    let max_id_attempts = match env(ENV_MAX_ID_ATTEMPTS) {
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .with_context(|| format!("Invalid {}: {}", ENV_MAX_ID_ATTEMPTS, raw))?,
        None => file_attempts.unwrap_or(DEFAULT_MAX_ID_ATTEMPTS),
    };
    if max_id_attempts == 0 {
        anyhow::bail!("max_id_attempts must be at least 1");
    }

    let max_id = file_max_id.unwrap_or(MAX_CONTENT_ID);
    if max_id == 0 || max_id > MAX_CONTENT_ID {
        anyhow::bail!("max_id must be in [1, {}], got {}", MAX_CONTENT_ID, max_id);
    }

    Ok(ResolvedConfig {
        store: StoreSettings {
            root,
            max_id_attempts,
            max_id,
        },
        config_file,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    resolve(find_config_file(), |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
