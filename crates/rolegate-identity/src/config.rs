//! Configuration loading.
//!
//! Three layered sources, later ones winning:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables with the `ROLEGATE_` prefix and `__` as
//!    the nested-key separator, e.g. `ROLEGATE_CACHE__LIFETIME_SECS=30`
//!    overrides `cache.lifetime_secs`.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the identity and access layer.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AuthConfig {
    /// External identity provider settings
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Provider-outcome cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Parent-lookup batching settings
    #[serde(default)]
    pub batch: BatchSettings,
}

/// External identity-provider settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProviderSettings {
    /// Base URL of the identity provider; `/account.json` is appended.
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

fn default_provider_base_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_provider_timeout() -> u64 {
    10
}

/// Settings for the cache of provider outcomes.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    /// Entry lifetime in seconds. Applies to rejections too, so a
    /// revoked token can stay usable for up to this long.
    #[serde(default = "default_cache_lifetime")]
    pub lifetime_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            lifetime_secs: default_cache_lifetime(),
        }
    }
}

fn default_cache_lifetime() -> u64 {
    60
}

/// Settings for the parent-lookup batch loaders.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BatchSettings {
    /// Batching window in milliseconds. Lookups enqueued within one
    /// window share a single backend fetch.
    #[serde(default = "default_batch_window")]
    pub window_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            window_ms: default_batch_window(),
        }
    }
}

fn default_batch_window() -> u64 {
    5
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl AuthConfig {
    /// Loads configuration from a YAML file with environment variable
    /// overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&AuthConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(
                Environment::with_prefix("ROLEGATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let auth_config: AuthConfig = config.try_deserialize()?;
        auth_config.validate()?;

        Ok(auth_config)
    }

    /// Loads configuration from environment variables only, on top of
    /// the defaults.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&AuthConfig::default())?)
            .add_source(
                Environment::with_prefix("ROLEGATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let auth_config: AuthConfig = config.try_deserialize()?;
        auth_config.validate()?;

        Ok(auth_config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.provider.base_url.trim().is_empty() {
            return Err(ConfigLoadError::Invalid {
                message: "provider.base_url must not be empty".to_string(),
            });
        }

        if self.provider.timeout_secs == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "provider.timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.cache.lifetime_secs == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "cache.lifetime_secs must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs)
    }

    pub fn cache_lifetime(&self) -> Duration {
        Duration::from_secs(self.cache.lifetime_secs)
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch.window_ms)
    }
}
