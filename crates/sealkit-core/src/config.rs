use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SealkitError, SealkitResult};

/// Top-level configuration (loaded from sealkit.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealkitConfig {
    pub logging: LoggingConfig,
    pub crypto: CryptoConfig,
    pub bundle: BundleConfig,
}

impl SealkitConfig {
    /// Parse a configuration from TOML text. Missing sections fall back to defaults.
    pub fn from_toml_str(content: &str) -> SealkitResult<Self> {
        toml::from_str(content).map_err(|e| SealkitError::Config(e.to_string()))
    }

    /// Load configuration from `path`, or defaults if the file does not exist.
    pub fn load(path: &Path) -> SealkitResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| SealkitError::Config(format!("{}: {e}", path.display())))
    }

    /// Render the configuration as pretty TOML
    pub fn to_toml_string(&self) -> SealkitResult<String> {
        toml::to_string_pretty(self).map_err(|e| SealkitError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info). `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Cipher material generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Start background key generation as soon as the factory is built,
    /// instead of on the first cipher request (default: true)
    pub eager_generation: bool,
    /// Name given to the background generation thread
    pub worker_thread_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Saved-state bundle file
    pub path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            eager_generation: true,
            worker_thread_name: "sealkit-keygen".into(),
        }
    }
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".sealkit/state.json"),
        }
    }
}
