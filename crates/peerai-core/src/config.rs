//! Configuration system for peerai.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PEERAI_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/peerai/config.toml
//!   3. ~/.config/peerai/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeeraiConfig {
    pub server: ServerConfig,
    pub matchmaking: MatchmakingConfig,
    pub peer: PeerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub bind_addr: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty = any origin.
    pub allowed_origins: Vec<String>,
    /// Directory of static frontend files served at `/`. None = disabled.
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Lease on a helper reservation. 0 = reservations never expire.
    pub reservation_ttl_secs: u64,
    /// How often expired reservations are reaped.
    pub reap_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Signaling endpoint of the server.
    pub server_url: String,
    /// Result of the device capability probe, announced on join.
    pub capable: bool,
    /// Prepended to every request context.
    pub system_prompt: String,
    /// Deadline for a whole request/reply exchange.
    pub exchange_timeout_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 3000,
            allowed_origins: Vec::new(),
            static_dir: None,
        }
    }
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_secs: 0,
            reap_interval_secs: 5,
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:3000/ws".to_string(),
            capable: false,
            system_prompt: "You are a helpful AI assistant.".to_string(),
            exchange_timeout_secs: 120,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("peerai")
}

fn home_dir() -> PathBuf {
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

impl PeeraiConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            PeeraiConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a config file without applying env overrides.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PEERAI_CONFIG")
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
            let text = toml::to_string_pretty(&PeeraiConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply PEERAI_* overrides. `lookup` is the environment.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Plain PORT is what hosting platforms set.
        if let Some(p) = lookup("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = p;
        }
        if let Some(p) = lookup("PEERAI_SERVER__PORT").and_then(|v| v.parse().ok()) {
            self.server.port = p;
        }
        if let Some(v) = lookup("PEERAI_SERVER__BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("PEERAI_SERVER__STATIC_DIR") {
            self.server.static_dir = if v.is_empty() {
                None
            } else {
                Some(PathBuf::from(v))
            };
        }
        if let Some(v) = lookup("PEERAI_SERVER__ALLOWED_ORIGINS") {
            self.server.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(t) =
            lookup("PEERAI_MATCHMAKING__RESERVATION_TTL_SECS").and_then(|v| v.parse().ok())
        {
            self.matchmaking.reservation_ttl_secs = t;
        }
        if let Some(v) = lookup("PEERAI_PEER__SERVER_URL") {
            self.peer.server_url = v;
        }
        if let Some(v) = lookup("PEERAI_PEER__CAPABLE") {
            self.peer.capable = v == "true" || v == "1";
        }
    }
}
