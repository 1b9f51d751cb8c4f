//! Configuration system for Vista.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $VISTA_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/vista/config.toml
//!   3. ~/.config/vista/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::{DEFAULT_CHUNK_SIZE, MAX_PAYLOAD};

/// Hard ceiling on `transfer.max_picture_bytes`, whatever the config says.
pub const MAX_PICTURE_BYTES_CEILING: u64 = 1024 * 1024 * 1024; // 1 GiB

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VistaConfig {
    pub network: NetworkConfig,
    pub transfer: TransferSettings,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address `vistad serve` listens on for picture requests.
    pub listen_addr: String,
    /// Local HTTP status port. 0 = disabled.
    pub status_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Payload bytes per outgoing chunk. Clamped to the wire maximum.
    pub chunk_size: usize,
    /// Largest picture either side will send or accept.
    pub max_picture_bytes: u64,
    /// A Fetching picture with no chunk for this long becomes Error.
    pub fetch_timeout_secs: u64,
    /// Concurrent decodes. 0 = available parallelism.
    pub decode_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `<picture-id>.png` files served to peers.
    pub picture_dir: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7400".to_string(),
            status_port: 7401,
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_picture_bytes: 16 * 1024 * 1024, // 16 MiB
            fetch_timeout_secs: 30,
            decode_workers: 0,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            picture_dir: data_dir().join("pictures"),
        }
    }
}

impl TransferSettings {
    /// Chunk size actually used on the wire: at least 1, at most `MAX_PAYLOAD`.
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(1, MAX_PAYLOAD)
    }

    /// Size limit actually enforced: at most `MAX_PICTURE_BYTES_CEILING`.
    pub fn effective_max_picture_bytes(&self) -> u64 {
        self.max_picture_bytes.min(MAX_PICTURE_BYTES_CEILING)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn effective_decode_workers(&self) -> usize {
        if self.decode_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.decode_workers
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("vista")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("vista")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl VistaConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            VistaConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("VISTA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&VistaConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply VISTA_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("VISTA_NETWORK__LISTEN_ADDR") {
            self.network.listen_addr = v;
        }
        if let Ok(v) = std::env::var("VISTA_NETWORK__STATUS_PORT") {
            if let Ok(p) = v.parse() {
                self.network.status_port = p;
            }
        }
        if let Ok(v) = std::env::var("VISTA_TRANSFER__CHUNK_SIZE") {
            if let Ok(n) = v.parse() {
                self.transfer.chunk_size = n;
            }
        }
        if let Ok(v) = std::env::var("VISTA_TRANSFER__MAX_PICTURE_BYTES") {
            if let Ok(n) = v.parse() {
                self.transfer.max_picture_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("VISTA_TRANSFER__FETCH_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.transfer.fetch_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("VISTA_TRANSFER__DECODE_WORKERS") {
            if let Ok(n) = v.parse() {
                self.transfer.decode_workers = n;
            }
        }
        if let Ok(v) = std::env::var("VISTA_STORE__PICTURE_DIR") {
            self.store.picture_dir = PathBuf::from(v);
        }
    }
}
