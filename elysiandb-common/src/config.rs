//! # Configuration
//!
//! Purpose: load the on-disk YAML configuration into a typed struct with
//! defaults applied so a missing or partial file is never fatal on its own.
//!
//! ## Design Principles
//! 1. **Defaults Everywhere**: every field has a sane default; an empty file
//!    is legal.
//! 2. **Missing File Is a Warning**: only a malformed file is fatal.
//! 3. **Forward Compatibility**: the HTTP section is parsed even though this
//!    build never acts on it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ElysianError, ElysianResult};

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
    pub stats: StatsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store: StoreConfig::default(),
            server: ServerConfig::default(),
            log: LogConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

/// Storage engine and snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the snapshot files.
    pub folder: String,
    /// Reported shard count; the engine's real shard count is fixed at 128.
    pub shards: usize,
    /// Snapshot flush cadence. Zero or negative disables periodic flushing.
    pub flush_interval_seconds: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            folder: "./data".to_string(),
            shards: 128,
            flush_interval_seconds: 5,
        }
    }
}

/// Network-facing server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub tcp: TcpConfig,
    pub http: HttpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            tcp: TcpConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

/// Line-protocol TCP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8088,
        }
    }
}

/// HTTP façade settings, parsed for forward compatibility only.
///
/// This build never starts an HTTP listener; the façade is an external
/// collaborator layered on top of the store's public operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            enabled: false,
            host: "0.0.0.0".to_string(),
            port: 8089,
        }
    }
}

/// Logging cadence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub flush_interval_seconds: i64,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            flush_interval_seconds: 5,
        }
    }
}

/// In-process counter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub enabled: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig { enabled: true }
    }
}

impl Config {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist. A file that exists but fails to parse is fatal.
    pub fn load(path: impl AsRef<Path>) -> ElysianResult<Self> {
        let path = path.as_ref();
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                return Ok(Config::default());
            }
            Err(err) => {
                return Err(ElysianError::fatal_path(
                    "could not read configuration file",
                    &path.to_path_buf(),
                    err,
                ));
            }
        };

        if data.trim().is_empty() {
            return Ok(Config::default());
        }

        serde_yaml::from_str(&data).map_err(|err| {
            ElysianError::fatal_path("invalid configuration YAML", &path.to_path_buf(), err)
        })
    }

    /// Validates cross-field invariants that are cheap to check up front.
    ///
    /// This only warns on a shard-count mismatch since the engine's shard
    /// count is compiled in; it returns an error only for an enabled
    /// listener bound to port zero, which `TcpListener::bind` would accept
    /// as "any free port" and surprise an operator expecting a fixed port.
    pub fn validate(&self) -> ElysianResult<()> {
        if self.store.shards != 128 {
            tracing::warn!(
                configured = self.store.shards,
                actual = 128,
                "store.shards is reported only; the engine always uses 128 shards"
            );
        }

        if self.server.tcp.enabled && self.server.tcp.port == 0 {
            return Err(ElysianError::Fatal(
                "server.tcp.port must be nonzero when server.tcp.enabled is true".to_string(),
            ));
        }

        Ok(())
    }
}
