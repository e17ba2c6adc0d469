//! Configuration file support for MELA.
//!
//! Settings are stored as versioned JSON: user preferences plus the address and
//! contract of the analysis service. The access credential itself is never
//! stored; the config only names the environment variable that holds it.

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::analysis::ResponseContract;
use crate::constants::{
    DEFAULT_CREDENTIAL_ENV_VAR, DEFAULT_CREDENTIAL_HEADER, DEFAULT_REQUEST_TIMEOUT_SECS,
    ENDPOINT_ENV_VAR,
};
use crate::error::AnalysisError;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Get the display name for this log level.
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "Error",
            LogLevel::Warn => "Warn",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
            LogLevel::Trace => "Trace",
        }
    }

    /// Parse a level name case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|level| level.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Get all log levels in order from least to most verbose.
    pub fn all() -> &'static [LogLevel] {
        &[
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ]
    }

    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Application configuration that can be exported and imported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Application name (for identification)
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// User preferences
    #[serde(default)]
    pub preferences: UserPreferences,

    /// Analysis service settings
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

fn default_app_name() -> String {
    "MELA".to_string()
}

/// User preferences section of the config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Folder where result images are exported (native only)
    #[serde(default)]
    pub output_dir: String,
}

/// Analysis service section of the config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Absolute URL of the analysis endpoint
    #[serde(default)]
    pub url: Option<String>,

    /// Which response shape the endpoint returns
    #[serde(default)]
    pub contract: ResponseContract,

    /// Header used to send the access credential
    #[serde(default = "default_credential_header")]
    pub credential_header: String,

    /// Environment variable the credential is read from
    #[serde(default = "default_credential_env")]
    pub credential_env: String,

    /// Upper bound on one request, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_credential_header() -> String {
    DEFAULT_CREDENTIAL_HEADER.to_string()
}

fn default_credential_env() -> String {
    DEFAULT_CREDENTIAL_ENV_VAR.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: None,
            contract: ResponseContract::default(),
            credential_header: default_credential_header(),
            credential_env: default_credential_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            app_name: default_app_name(),
            preferences: UserPreferences::default(),
            endpoint: EndpointConfig::default(),
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        // Validate version compatibility
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    /// Get the default filename for config export.
    pub fn default_filename() -> &'static str {
        "mela-config.json"
    }

    /// Resolve the settings the analysis client needs, reading the process
    /// environment for overrides and the credential.
    pub fn client_config(&self) -> Result<ClientConfig, AnalysisError> {
        self.client_config_for(None)
    }

    /// Like [`client_config`](Self::client_config), with an endpoint given
    /// explicitly by the caller (a command line flag) taking precedence.
    pub fn client_config_for(&self, explicit: Option<&str>) -> Result<ClientConfig, AnalysisError> {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.client_config_with(explicit, |key| std::env::var(key).ok())
        }
        #[cfg(target_arch = "wasm32")]
        {
            self.client_config_with(explicit, |_| None)
        }
    }

    /// Resolve client settings against an arbitrary variable lookup.
    ///
    /// The endpoint is taken from `explicit`, then `MELA_ENDPOINT_URL`, then
    /// the configured url. A missing or unparsable address is a
    /// configuration error.
    pub fn client_config_with<F>(
        &self,
        explicit: Option<&str>,
        lookup: F,
    ) -> Result<ClientConfig, AnalysisError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = explicit
            .map(str::to_string)
            .or_else(|| lookup(ENDPOINT_ENV_VAR))
            .or_else(|| self.endpoint.url.clone())
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                AnalysisError::Configuration(format!(
                    "analysis endpoint address is not configured (set endpoint.url or {})",
                    ENDPOINT_ENV_VAR
                ))
            })?;

        let mut client = ClientConfig::new(&raw_url)?
            .with_contract(self.endpoint.contract)
            .with_timeout(Duration::from_secs(self.endpoint.timeout_secs.max(1)));

        if let Some(value) = lookup(&self.endpoint.credential_env).filter(|v| !v.is_empty()) {
            client = client.with_credential(&self.endpoint.credential_header, value);
        }

        Ok(client)
    }

    /// Get the default config file path for auto-load/save.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn default_path() -> Option<std::path::PathBuf> {
        // Try to use XDG config directory, fall back to home directory
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("mela").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home_dir| {
                home_dir
                    .join(".config")
                    .join("mela")
                    .join(Self::default_filename())
            })
        }
    }

    /// Load configuration from a specific file.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Try to load configuration from the default path.
    /// Returns None if the file doesn't exist or can't be read.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return None;
        }

        match Self::load_from_path(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Failed to load config file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Save configuration to the default path.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_default_path(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or_else(|| {
            ConfigError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            ))
        })?;

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = self.to_json()?;
        std::fs::write(&path, json)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// LocalStorage key for WASM config persistence.
    #[cfg(target_arch = "wasm32")]
    const LOCALSTORAGE_KEY: &'static str = "mela-config";

    /// Try to load configuration from localStorage (WASM only).
    /// Returns None if not found or can't be parsed.
    #[cfg(target_arch = "wasm32")]
    pub fn load_from_local_storage() -> Option<Self> {
        let window = web_sys::window()?;
        let storage = window.local_storage().ok()??;

        match storage.get_item(Self::LOCALSTORAGE_KEY) {
            Ok(Some(json)) => match Self::from_json(&json) {
                Ok(config) => {
                    log::info!("Loaded configuration from localStorage");
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse config from localStorage: {}", e);
                    None
                }
            },
            Ok(None) => {
                log::debug!("No config found in localStorage");
                None
            }
            Err(e) => {
                log::warn!("Failed to read from localStorage: {:?}", e);
                None
            }
        }
    }

    /// Save configuration to localStorage (WASM only).
    #[cfg(target_arch = "wasm32")]
    pub fn save_to_local_storage(&self) -> Result<(), ConfigError> {
        let window = web_sys::window()
            .ok_or_else(|| ConfigError::StorageError("No window object available".to_string()))?;

        let storage = window
            .local_storage()
            .map_err(|e| ConfigError::StorageError(format!("localStorage access error: {:?}", e)))?
            .ok_or_else(|| ConfigError::StorageError("localStorage not available".to_string()))?;

        let json = self.to_json()?;

        storage
            .set_item(Self::LOCALSTORAGE_KEY, &json)
            .map_err(|e| {
                ConfigError::StorageError(format!("Failed to save to localStorage: {:?}", e))
            })?;

        log::info!("Saved configuration to localStorage");
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Static access credential sent with every request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Header name
    pub header: String,
    /// Secret value
    pub value: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("header", &self.header)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Validated settings for one analysis client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Analysis endpoint
    pub endpoint: Url,
    /// Expected response shape
    pub contract: ResponseContract,
    /// Optional access credential
    pub credential: Option<Credential>,
    /// Bound after which an unanswered request is a transport error
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Create client settings for an endpoint address.
    pub fn new(endpoint: &str) -> Result<Self, AnalysisError> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            AnalysisError::Configuration(format!("invalid endpoint address '{}': {}", endpoint, e))
        })?;

        Ok(Self {
            endpoint,
            contract: ResponseContract::default(),
            credential: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    /// Set the expected response contract.
    pub fn with_contract(mut self, contract: ResponseContract) -> Self {
        self.contract = contract;
        self
    }

    /// Attach a credential header.
    pub fn with_credential(mut self, header: &str, value: impl Into<String>) -> Self {
        self.credential = Some(Credential {
            header: header.to_string(),
            value: value.into(),
        });
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading/writing config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Storage error (localStorage in WASM)
    #[error("Storage error: {0}")]
    StorageError(String),
}
