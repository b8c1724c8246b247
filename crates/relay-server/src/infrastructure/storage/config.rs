//! TOML-based configuration for the relay.
//!
//! The relay reads an optional config file:
//! - given explicitly with `--config <PATH>` (or `RELAY_CONFIG`), or
//! - `$XDG_CONFIG_HOME/broadcast-relay/relay.toml`
//!   (`~/.config/broadcast-relay/relay.toml`) if it exists.
//!
//! Every field is optional; anything absent takes its built-in default.
//!
//! ```toml
//! [network]
//! port = 3490
//! bind_address = "0.0.0.0"
//! write_timeout_ms = 250
//!
//! [relay]
//! read_buffer_size = 256
//! initial_capacity = 5
//! on_delivery_failure = "keep"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file, so a file that
//! only sets `port` is a complete configuration.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core::DEFAULT_INITIAL_CAPACITY;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::settings::{DeliveryPolicy, RelaySettings, DEFAULT_READ_BUFFER_SIZE};

/// Port the relay listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 3490;

/// Largest accepted `relay.read_buffer_size` (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Largest accepted `relay.initial_capacity`.
pub const MAX_INITIAL_CAPACITY: usize = 65_536;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
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

    /// `network.bind_address` is not an IPv4 address.
    #[error("invalid bind address '{0}': expected an IPv4 address such as 0.0.0.0")]
    InvalidBindAddress(String),

    /// A size that must be positive was zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// A size exceeded its upper bound.
    #[error("{field} is {value}, above the maximum of {max}")]
    TooLarge {
        field: &'static str,
        value: usize,
        max: usize,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub relay: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listening socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// IPv4 address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Per-destination write timeout in milliseconds.  Absent = block until
    /// the kernel accepts the bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout_ms: Option<u64>,
}

/// Dispatch loop settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Maximum bytes taken from one client per read.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Connection registry slots reserved at startup, listener included.
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
    /// `"keep"` or `"drop"` a destination whose write failed.
    #[serde(default)]
    pub on_delivery_failure: DeliveryPolicy,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is not set:
    /// `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`, or a full
    /// `EnvFilter` expression.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}
fn default_initial_capacity() -> usize {
    DEFAULT_INITIAL_CAPACITY
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            write_timeout_ms: None,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: default_read_buffer_size(),
            initial_capacity: default_initial_capacity(),
            on_delivery_failure: DeliveryPolicy::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl RelayConfig {
    /// Checks every value the relay cannot start with.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidBindAddress`], [`ConfigError::Zero`] or
    /// [`ConfigError::TooLarge`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.relay.read_buffer_size == 0 {
            return Err(ConfigError::Zero("relay.read_buffer_size"));
        }
        if self.relay.initial_capacity == 0 {
            return Err(ConfigError::Zero("relay.initial_capacity"));
        }
        check_max(
            "relay.read_buffer_size",
            self.relay.read_buffer_size,
            MAX_READ_BUFFER_SIZE,
        )?;
        check_max(
            "relay.initial_capacity",
            self.relay.initial_capacity,
            MAX_INITIAL_CAPACITY,
        )?;
        Ok(())
    }

    /// The IPv4 socket address to listen on.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidBindAddress`] if `bind_address` is not IPv4.
    pub fn bind_addr(&self) -> Result<SocketAddrV4, ConfigError> {
        let ip: Ipv4Addr = self
            .network
            .bind_address
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.network.bind_address.clone()))?;
        Ok(SocketAddrV4::new(ip, self.network.port))
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        // A zero Duration is rejected by `set_write_timeout`; treat 0 as "off".
        self.network
            .write_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// The dispatch loop tunables.
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            read_buffer_size: self.relay.read_buffer_size,
            initial_capacity: self.relay.initial_capacity,
            delivery_policy: self.relay.on_delivery_failure,
        }
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Serialize`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn check_max(field: &'static str, value: usize, max: usize) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::TooLarge { field, value, max });
    }
    Ok(())
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration text.
///
/// # Errors
///
/// [`ConfigError::Parse`] if the TOML is malformed or a value has the wrong
/// type.
pub fn parse_config(text: &str) -> Result<RelayConfig, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Loads the config file at `path`.  The file must exist.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`] if
/// it is malformed.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

/// Loads the config file from the platform location, returning
/// `RelayConfig::default()` if there is none.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system errors other than "not found", and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_default_config() -> Result<RelayConfig, ConfigError> {
    let Some(path) = default_config_path() else {
        return Ok(RelayConfig::default());
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => parse_config(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayConfig::default()),
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}

/// `$XDG_CONFIG_HOME/broadcast-relay/relay.toml`, falling back to
/// `$HOME/.config`.  `None` if neither variable is set.
pub fn default_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("broadcast-relay").join("relay.toml"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
