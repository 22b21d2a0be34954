
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::layout::AssociationConfig;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text".to_string(),
            timeout_seconds: 30,
            retry_attempts: 1,
        }
    }
}

/// Page layout analysis and image association tuning, in PDF points
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Expansion applied to every text block before the overlap test
    pub margin: f32,
    /// Weight of the horizontal center distance in the nearest-block fallback
    pub horizontal_weight: f32,
    /// Maximum baseline difference for two text runs to share a line
    pub line_tolerance: f32,
    /// Maximum vertical gap between consecutive lines of one block
    pub block_gap: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            margin: 12.0,
            horizontal_weight: 0.25,
            line_tolerance: 3.0,
            block_gap: 6.0,
        }
    }
}

impl LayoutConfig {
    #[inline]
    pub const fn association(&self) -> AssociationConfig {
        AssociationConfig {
            margin: self.margin,
            horizontal_weight: self.horizontal_weight,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub top_k: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            top_k: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid layout setting {name}: {value} (must be a finite, non-negative number)")]
    InvalidLayoutValue { name: &'static str, value: f32 },
    #[error("Invalid server host: {0:?} (cannot be empty)")]
    InvalidServerHost(String),
    #[error("Invalid result count: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default data directory (`~/.pdf-rag`)
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".pdf-rag"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("pdf-rag"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    /// Defaults rooted at `base_dir`
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::with_base_dir(config_dir));
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.layout.validate()?;
        self.server.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    /// Directory extracted images are written to and served from
    #[inline]
    pub fn images_dir(&self) -> PathBuf {
        self.get_base_dir().join(crate::pdf::IMAGES_DIR_NAME)
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_timeout_seconds(&mut self, timeout_seconds: u64) -> Result<(), ConfigError> {
        if !(1..=600).contains(&timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(timeout_seconds));
        }
        self.timeout_seconds = timeout_seconds;
        Ok(())
    }

    #[inline]
    pub fn set_retry_attempts(&mut self, retry_attempts: u32) -> Result<(), ConfigError> {
        if !(1..=10).contains(&retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(retry_attempts));
        }
        self.retry_attempts = retry_attempts;
        Ok(())
    }
}

impl LayoutConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let values = [
            ("margin", self.margin),
            ("horizontal_weight", self.horizontal_weight),
            ("line_tolerance", self.line_tolerance),
            ("block_gap", self.block_gap),
        ];

        for (name, value) in values {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidLayoutValue { name, value });
            }
        }

        Ok(())
    }
}

impl ServerConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidServerHost(self.host.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if !(1..=100).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        Ok(())
    }

    /// `host:port` string suitable for binding a listener.
    ///
    /// IPv6 literals are bracketed, so `::1` binds as `[::1]:8000`.
    #[inline]
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
