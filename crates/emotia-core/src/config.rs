use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the configured credential
pub const API_KEY_ENV: &str = "EMOTIA_API_KEY";
/// Secondary credential variable, checked when [`API_KEY_ENV`] is unset
pub const FALLBACK_API_KEY_ENV: &str = "HF_API_KEY";

/// Get the local data directory for emotia.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("emotia");
    Ok(path)
}

/// Default location of `config.toml`.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("config.toml"))
}

/// Source of the bearer credential used for classification calls
pub trait CredentialProvider: Send + Sync {
    /// Current credential, or `None` if the user has not configured one
    fn credential(&self) -> Option<String>;
}

/// Fixed credential, mostly useful for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(pub Option<String>);

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Option<String> {
        self.0.clone().filter(|key| !key.trim().is_empty())
    }
}

/// Remote classification endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Total transport attempts per request
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    /// Cap on throttled (429) retries; unbounded when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_throttle_retries: Option<u32>,
    pub request_timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api-inference.huggingface.co".to_string(),
            model: "arpanghoshal/EmoRoBERTa".to_string(),
            api_key: None,
            max_retries: 3,
            base_backoff_ms: 1000,
            max_throttle_retries: None,
            request_timeout_secs: 30,
        }
    }
}

impl ClassifierConfig {
    #[must_use]
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Sliding-window quota
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_ms: 60_000,
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// SQLite file backing the cache; defaults to `<data dir>/cache.db`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
            path: None,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Real-time channel settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub server_url: String,
    pub reconnect_base_ms: u64,
    pub reconnect_cap_ms: u64,
    pub keepalive_ms: u64,
    pub typing_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8000/ws".to_string(),
            reconnect_base_ms: 1000,
            reconnect_cap_ms: 30_000,
            keepalive_ms: 30_000,
            typing_timeout_ms: 2000,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    #[must_use]
    pub fn reconnect_cap(&self) -> Duration {
        Duration::from_millis(self.reconnect_cap_ms)
    }

    #[must_use]
    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }

    #[must_use]
    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }

    /// Channel URL for a given user: `<server_url>/<user_id>`
    #[must_use]
    pub fn channel_url(&self, user_id: &str) -> String {
        format!("{}/{user_id}", self.server_url.trim_end_matches('/'))
    }
}

/// Top-level configuration, stored as `config.toml` in the data directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub classifier: ClassifierConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&raw)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        let env_key = std::env::var(API_KEY_ENV)
            .ok()
            .or_else(|| std::env::var(FALLBACK_API_KEY_ENV).ok());
        config.apply_credential_override(env_key);
        Ok(config)
    }

    /// Write configuration as TOML, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let raw = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Replace the configured credential when an override is present and non-empty
    pub fn apply_credential_override(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.classifier.api_key = Some(key);
        }
    }

    /// Path of the SQLite cache database.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the data directory cannot be determined.
    pub fn cache_db_path(&self) -> Result<PathBuf> {
        match &self.cache.path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_data_dir()?.join("cache.db")),
        }
    }
}

impl CredentialProvider for Config {
    fn credential(&self) -> Option<String> {
        self.classifier
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
    }
}
