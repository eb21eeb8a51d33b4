//! Configuration file parser for newsrack deployments.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which carries the built-in source line-up and fetch tunables. Unknown
//! keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::feed::{
    FetchOptions, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_FEED_TTL, DEFAULT_MAX_BODY_BYTES,
    DEFAULT_SOURCE_TIMEOUT,
};
use crate::source::{default_sources, Source};
use crate::storage::{DEFAULT_SWEEP_INITIAL_DELAY, DEFAULT_SWEEP_INTERVAL};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified. Missing keys fall back to `Default::default()`; in
/// particular, a config file with no `[[sources]]` entries keeps the
/// built-in line-up.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    /// News sources to refresh. Listing any source replaces the built-in
    /// line-up entirely.
    pub sources: Vec<Source>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            cache: CacheConfig::default(),
            sources: default_sources(),
        }
    }
}

/// Network tunables for the fetch cascade.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Seconds allowed per proxy attempt before failing over.
    pub attempt_timeout_secs: u64,

    /// End-to-end budget in seconds for refreshing one source.
    pub source_timeout_secs: u64,

    /// Response body size cap in bytes.
    pub max_body_bytes: usize,

    /// Origin header presented to relay proxies that require one.
    pub origin: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT.as_secs(),
            source_timeout_secs: DEFAULT_SOURCE_TIMEOUT.as_secs(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            origin: None,
        }
    }
}

impl FetchConfig {
    /// The equivalent [`FetchOptions`] for the fetch and cache layers.
    pub fn options(&self) -> FetchOptions {
        FetchOptions {
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            source_timeout: Duration::from_secs(self.source_timeout_secs),
            max_body_bytes: self.max_body_bytes,
            origin: self.origin.clone(),
        }
    }
}

/// Cache placement and maintenance cadence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds an in-memory feed entry absorbs repeat refreshes.
    pub feed_ttl_secs: u64,

    /// Path of the SQLite cache database.
    pub db_path: String,

    /// Seconds between background cache sweeps.
    pub sweep_interval_secs: u64,

    /// Seconds before the first background sweep.
    pub sweep_initial_delay_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            feed_ttl_secs: DEFAULT_FEED_TTL.as_secs(),
            db_path: "newsrack-cache.db".to_string(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
            sweep_initial_delay_secs: DEFAULT_SWEEP_INITIAL_DELAY.as_secs(),
        }
    }
}

impl CacheConfig {
    pub fn feed_ttl(&self) -> Duration {
        Duration::from_secs(self.feed_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn sweep_initial_delay(&self) -> Duration {
        Duration::from_secs(self.sweep_initial_delay_secs)
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {} // Size is within limits, proceed
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = ["fetch", "cache", "sources"];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
