//! Config module - Manages Marklight sync configuration (sync.toml).
//!
//! Configuration file contains:
//! - GitHub credentials (personal access token)
//! - Target repository and file path
//! - Sync on/off flag
//!
//! The sync store never touches storage directly; it goes through the
//! [`ConfigStore`] trait so hosts (extension bridge, CLI, tests) can
//! supply their own backing store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Token prefixes GitHub currently issues for personal access tokens.
const KNOWN_TOKEN_PREFIXES: &[&str] = &["ghp_", "github_pat_"];

/// GitHub sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Personal access token (opaque secret)
    #[serde(default)]
    pub token: String,

    /// Whether GitHub sync is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Repository owner (user or org)
    #[serde(default)]
    pub repo_owner: String,

    /// Repository name
    #[serde(default)]
    pub repo_name: String,

    /// Path of the highlights file inside the repository
    #[serde(default = "default_file_path")]
    pub file_path: String,
}

fn default_file_path() -> String {
    "data/highlights.json".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            enabled: false,
            repo_owner: String::new(),
            repo_name: String::new(),
            file_path: default_file_path(),
        }
    }
}

impl SyncConfig {
    /// Whether every field required for sync is present.
    ///
    /// A config that is enabled but incomplete is a user error; the sync
    /// store degrades to a no-op rather than failing hard.
    pub fn is_complete(&self) -> bool {
        !self.token.is_empty() && !self.repo_owner.is_empty() && !self.repo_name.is_empty()
    }

    /// Best-effort check that the token looks like a GitHub PAT.
    ///
    /// Fine-grained and classic tokens carry known prefixes. An unknown
    /// prefix is only worth a warning: GitHub may introduce new formats
    /// and the API is the final authority.
    pub fn has_known_token_prefix(&self) -> bool {
        KNOWN_TOKEN_PREFIXES
            .iter()
            .any(|prefix| self.token.starts_with(prefix))
    }

    /// Log a warning if the token format looks wrong. No-op when empty.
    pub fn warn_on_suspect_token(&self) {
        if !self.token.is_empty() && !self.has_known_token_prefix() {
            warn!("GitHub token does not match a known token prefix");
        }
    }
}

/// Persistent key-value store for sync settings.
///
/// Implementations must persist across process restarts; the sync store
/// reloads on every operation and never caches a config.
pub trait ConfigStore: Send + Sync {
    /// Load the current configuration.
    fn load(&self) -> Result<SyncConfig>;

    /// Persist a new configuration.
    fn save(&self, config: &SyncConfig) -> Result<()>;
}

/// Get default config directory (~/.config/marklight/).
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("marklight"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get default sync config file path.
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("sync.toml")
}

/// TOML-file-backed config store.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Create a store at the default config path.
    pub fn new() -> Self {
        Self {
            path: default_config_path(),
        }
    }

    /// Create a store at a specific path.
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<SyncConfig> {
        if !self.path.exists() {
            return Ok(SyncConfig::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read config file: {}", self.path.display()))?;

        let config: SyncConfig = toml::from_str(&content)
            .with_context(|| format!("Cannot parse config file: {}", self.path.display()))?;

        Ok(config)
    }

    fn save(&self, config: &SyncConfig) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(config).with_context(|| "Cannot serialize config to TOML")?;

        std::fs::write(&self.path, content)
            .with_context(|| format!("Cannot write config file: {}", self.path.display()))?;

        // Restrict file permissions on Unix; the file holds the token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

/// In-process config store for embedding hosts and tests.
///
/// Extension bridges that already hold settings in the browser's synced
/// storage can mirror them here instead of writing a file.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    inner: Mutex<SyncConfig>,
}

impl MemoryConfigStore {
    /// Create an empty store (sync disabled).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with a configuration.
    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            inner: Mutex::new(config),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<SyncConfig> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("config store lock poisoned"))?
            .clone())
    }

    fn save(&self, config: &SyncConfig) -> Result<()> {
        *self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("config store lock poisoned"))? = config.clone();
        Ok(())
    }
}
