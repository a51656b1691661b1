//! TOML-based configuration persistence.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\RoonConnect\config.toml`
//! - Linux:    `~/.config/roon-connect/config.toml`
//! - macOS:    `~/Library/Application Support/RoonConnect/config.toml`
//!
//! ```toml
//! [general]
//! log_level = "info"
//!
//! [discovery]
//! timeout_ms = 5000
//! multicast_addr = "239.255.90.90:9003"
//!
//! [connection]
//! auth_timeout_secs = 120
//!
//! [saved_server]
//! unique_id = "c0ffee00-..."
//! host = "10.0.0.5"
//! port = 9100
//! token = "..."
//! ```
//!
//! Every field carries a `#[serde(default = ...)]` so an empty file, a file
//! from an older version, or no file at all yields a working configuration.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use roon_core::ServerDescriptor;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::connection::ConnectionConfig;
use crate::infrastructure::network::discovery::DiscoverySettings;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field parsed as TOML but holds an unusable value.
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub connection: ConnectionSettings,
    /// Last server the user authenticated against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_server: Option<SavedServerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Discovery round parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_multicast_addr")]
    pub multicast_addr: String,
    #[serde(default = "default_broadcast_addr")]
    pub broadcast_addr: String,
    /// Local address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_multicast_ttl")]
    pub multicast_ttl: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSettings {
    /// Seconds to wait for the user to enable the extension in Roon.
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
}

/// Persisted record of the last authorized server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedServerEntry {
    #[serde(default)]
    pub unique_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_multicast_addr() -> String {
    "239.255.90.90:9003".to_string()
}
fn default_broadcast_addr() -> String {
    "255.255.255.255:9003".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_multicast_ttl() -> u32 {
    1
}
fn default_auth_timeout_secs() -> u64 {
    120
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            multicast_addr: default_multicast_addr(),
            broadcast_addr: default_broadcast_addr(),
            bind_address: default_bind_address(),
            multicast_ttl: default_multicast_ttl(),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            auth_timeout_secs: default_auth_timeout_secs(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl DiscoveryConfig {
    /// Parses the address strings into engine settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first unparsable field.
    pub fn to_settings(&self) -> Result<DiscoverySettings, ConfigError> {
        Ok(DiscoverySettings {
            multicast_target: parse_field("discovery.multicast_addr", &self.multicast_addr)?,
            broadcast_target: parse_field("discovery.broadcast_addr", &self.broadcast_addr)?,
            bind_address: parse_field::<IpAddr>("discovery.bind_address", &self.bind_address)?,
            multicast_ttl: self.multicast_ttl,
            timeout: self.timeout(),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AppConfig {
    /// Timing settings for the connection state machine.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            auth_timeout: Duration::from_secs(self.connection.auth_timeout_secs),
            discovery_timeout: self.discovery.timeout(),
        }
    }
}

impl SavedServerEntry {
    /// Builds the entry written after a successful authorization.
    pub fn new(server: &ServerDescriptor, token: Option<String>) -> Self {
        Self {
            unique_id: server.unique_id.clone(),
            display_name: server.display_name.clone(),
            host: server.host.clone(),
            port: server.port,
            version: server.version.clone(),
            token,
        }
    }

    /// The stored server, or `None` when the entry is incomplete.
    pub fn descriptor(&self) -> Option<ServerDescriptor> {
        let server = ServerDescriptor {
            unique_id: self.unique_id.clone(),
            display_name: self.display_name.clone(),
            host: self.host.clone(),
            port: self.port,
            version: self.version.clone(),
        };
        server.validate().ok().map(|()| server)
    }
}

fn parse_field<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform config file.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no config at {}, using defaults", path.display());
            Ok(AppConfig::default())
        }
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Like [`load_config_from`], but an unreadable or corrupt file yields defaults.
pub fn load_config_or_default(path: &Path) -> AppConfig {
    load_config_from(path).unwrap_or_else(|e| {
        warn!("ignoring config at {}: {e}", path.display());
        AppConfig::default()
    })
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(&config_file_path()?, config)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Deletes the config file at `path`.  A missing file is not an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file exists but cannot be removed.
pub fn clear_config(path: &Path) -> Result<(), ConfigError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Resolves the platform config directory including the application subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("RoonConnect"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("roon-connect"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("RoonConnect")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
