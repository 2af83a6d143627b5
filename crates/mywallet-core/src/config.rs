//! Application configuration management.
//!
//! Configuration is stored at `~/.config/mywallet/config.json` and can be
//! overridden per field from `MYWALLET_*` environment variables.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Application name used for config/data directory paths
const APP_NAME: &str = "mywallet";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com";
const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com";

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Which identity provider signs users in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// The wallet API's own `/auth/login` endpoint.
    #[default]
    Rest,
    /// A hosted identity service (email/password accounts).
    Managed,
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rest" => Ok(Self::Rest),
            "managed" => Ok(Self::Managed),
            other => Err(anyhow::anyhow!("Unknown identity provider: {}", other)),
        }
    }
}

/// Where the persisted session record lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::str::FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("Unknown session storage: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagedIdentityConfig {
    pub api_key: Option<String>,
    pub identity_url: String,
    pub token_url: String,
}

impl Default for ManagedIdentityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub provider: ProviderKind,
    pub managed: ManagedIdentityConfig,
    pub storage: StorageKind,
    pub request_timeout_secs: u64,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            provider: ProviderKind::default(),
            managed: ManagedIdentityConfig::default(),
            storage: StorageKind::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            last_username: None,
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Override fields from `MYWALLET_*` variables. `lookup` is injected so
    /// tests don't have to touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MYWALLET_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(provider) = lookup("MYWALLET_PROVIDER") {
            self.provider = provider.parse()?;
        }
        if let Some(key) = lookup("MYWALLET_IDENTITY_API_KEY") {
            self.managed.api_key = Some(key);
        }
        if let Some(url) = lookup("MYWALLET_IDENTITY_URL") {
            self.managed.identity_url = url;
        }
        if let Some(url) = lookup("MYWALLET_TOKEN_URL") {
            self.managed.token_url = url;
        }
        if let Some(storage) = lookup("MYWALLET_STORAGE") {
            self.storage = storage.parse()?;
        }
        if let Some(secs) = lookup("MYWALLET_TIMEOUT_SECS") {
            self.request_timeout_secs = secs
                .parse()
                .with_context(|| format!("Invalid MYWALLET_TIMEOUT_SECS: {}", secs))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.provider == ProviderKind::Managed && self.managed.api_key.is_none() {
            anyhow::bail!("The managed identity provider requires MYWALLET_IDENTITY_API_KEY");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("Request timeout must be at least one second");
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the file-backed session record.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
