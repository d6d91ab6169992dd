//! Configuration system for homelink.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $HOMELINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/homelink/config.toml
//!   3. ~/.config/homelink/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::codec::DEFAULT_CHUNK_SIZE;
use crate::wire::{HEADER_SIZE, MAX_MESSAGE};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HomelinkConfig {
    pub transfer: TransferConfig,
    pub reassembly: ReassemblyConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
}

/// Producer side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Fragment data size in bytes. Must be non-zero.
    pub chunk_size: u32,
    /// Tag identifying this producer to consumers.
    pub producer_id: String,
    /// Free-form producer class, e.g. "home" or "vehicle".
    pub producer_kind: String,
}

/// Consumer side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    /// Incomplete streams older than this are evicted.
    pub max_lifetime_secs: u64,
    /// How often the eviction sweep runs.
    pub sweep_interval_secs: u64,
    /// Largest total_size a new stream may declare. 0 = unlimited.
    pub max_stream_bytes: u64,
    /// Max concurrently open streams. 0 = unlimited.
    pub max_streams: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local UDP address fragments are received on.
    pub bind_addr: String,
    /// Where `send` delivers fragments.
    pub peer_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Completed payloads land here, one subdirectory per producer.
    pub payload_dir: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            producer_id: "homelink".to_string(),
            producer_kind: "home".to_string(),
        }
    }
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            max_lifetime_secs: 30,
            sweep_interval_secs: 5,
            max_stream_bytes: 64 * 1024 * 1024, // 64 MB
            max_streams: 256,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7410".to_string(),
            peer_addr: "127.0.0.1:7410".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            payload_dir: data_dir().join("payloads"),
        }
    }
}

impl ReassemblyConfig {
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    /// Never zero; tokio intervals panic on a zero period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("homelink")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("homelink")
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
    #[error("transfer.chunk_size must be non-zero")]
    ZeroChunkSize,
    #[error("transfer.chunk_size {chunk_size} too large, at most {max} fits one message")]
    ChunkSizeTooLarge { chunk_size: u32, max: usize },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl HomelinkConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            HomelinkConfig::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("HOMELINK_CONFIG")
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
            let text = toml::to_string_pretty(&HomelinkConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.transfer.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        let framing = HEADER_SIZE + self.transfer.producer_id.len() + self.transfer.producer_kind.len();
        let max = MAX_MESSAGE.saturating_sub(framing);
        if self.transfer.chunk_size as usize > max {
            return Err(ConfigError::ChunkSizeTooLarge {
                chunk_size: self.transfer.chunk_size,
                max,
            });
        }
        Ok(())
    }

    /// Apply HOMELINK_* overrides. `lookup` is `std::env::var` in production.
    /// Unparseable numeric values are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("HOMELINK_TRANSFER__CHUNK_SIZE") {
            if let Ok(n) = v.parse() {
                self.transfer.chunk_size = n;
            }
        }
        if let Some(v) = lookup("HOMELINK_TRANSFER__PRODUCER_ID") {
            self.transfer.producer_id = v;
        }
        if let Some(v) = lookup("HOMELINK_REASSEMBLY__MAX_LIFETIME_SECS") {
            if let Ok(n) = v.parse() {
                self.reassembly.max_lifetime_secs = n;
            }
        }
        if let Some(v) = lookup("HOMELINK_NETWORK__BIND_ADDR") {
            self.network.bind_addr = v;
        }
        if let Some(v) = lookup("HOMELINK_NETWORK__PEER_ADDR") {
            self.network.peer_addr = v;
        }
        if let Some(v) = lookup("HOMELINK_STORAGE__PAYLOAD_DIR") {
            self.storage.payload_dir = PathBuf::from(v);
        }
    }
}
