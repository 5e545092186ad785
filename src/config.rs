use mealswap_core::{StoreMode, DEFAULT_STORE_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Which store backs the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Files in the data directory
    #[default]
    Local,
    /// A `mealswap-server` instance
    Remote,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Local => write!(f, "local"),
            StoreKind::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(StoreKind::Local),
            "remote" => Ok(StoreKind::Remote),
            _ => Err(format!(
                "Invalid store mode '{}'. Valid options: local, remote",
                s
            )),
        }
    }
}

/// Remote store settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// Server URL (e.g., "http://localhost:8080")
    pub server_url: Option<String>,
    /// API key for authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Seconds before a store call counts as unavailable
    pub timeout_secs: Option<u64>,
}

impl StoreConfig {
    /// Returns true if the remote store is reachable in principle (has both
    /// server_url and api_key)
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.api_key.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_STORE_TIMEOUT)
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding the local cache and the session pointer
    pub data_dir: ConfigValue<PathBuf>,
    /// Local or remote store
    pub store_mode: ConfigValue<StoreKind>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Remote store settings
    pub store: StoreConfig,
}

/// `store:` section of the config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct StoreSection {
    mode: Option<StoreKind>,
    #[serde(flatten)]
    settings: StoreConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    store: Option<StoreSection>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut store_mode = ConfigValue::new(StoreKind::default(), ConfigSource::Default);
        let mut config_file = None;
        let mut store = StoreConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(section) = file_config.store {
                if let Some(mode) = section.mode {
                    store_mode = ConfigValue::new(mode, ConfigSource::File);
                }
                store = section.settings;
            }
        }

        // Apply environment variable overrides
        if let Ok(dir) = std::env::var("MEALSWAP_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(mode) = std::env::var("MEALSWAP_STORE_MODE") {
            let parsed = mode
                .parse::<StoreKind>()
                .map_err(|e| ConfigError::InvalidValue("MEALSWAP_STORE_MODE", e))?;
            store_mode = ConfigValue::new(parsed, ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("MEALSWAP_SERVER_URL") {
            store.server_url = Some(url);
        }
        if let Ok(key) = std::env::var("MEALSWAP_API_KEY") {
            store.api_key = Some(key);
        }

        Ok(Self {
            data_dir,
            store_mode,
            config_file,
            store,
        })
    }

    /// Resolves the configured store mode.
    ///
    /// Remote mode needs both a server URL and an API key.
    pub fn to_store_mode(&self) -> Result<StoreMode, ConfigError> {
        match self.store_mode.value {
            StoreKind::Local => Ok(StoreMode::Local {
                data_dir: self.data_dir.value.clone(),
            }),
            StoreKind::Remote => match (&self.store.server_url, &self.store.api_key) {
                (Some(server_url), Some(api_key)) => Ok(StoreMode::Remote {
                    server_url: server_url.clone(),
                    api_key: api_key.clone(),
                }),
                _ => Err(ConfigError::RemoteNotConfigured),
            },
        }
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/mealswap/
    /// - macOS: ~/Library/Application Support/mealswap/
    /// - Windows: %APPDATA%/mealswap/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mealswap")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/mealswap/
    /// - macOS: ~/Library/Application Support/mealswap/
    /// - Windows: %APPDATA%/mealswap/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mealswap")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
    RemoteNotConfigured,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(var, message) => write!(f, "{}: {}", var, message),
            ConfigError::RemoteNotConfigured => write!(
                f,
                "Remote store mode requires store.server_url and store.api_key"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
