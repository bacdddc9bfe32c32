//! Configuration schema for casecache
//!
//! Configuration is stored at `~/.config/casecache/config.toml`

use crate::cache::eviction::{EvictionPolicy, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_ENTRIES};
use crate::script::ScriptKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Artifact cache settings
    pub cache: CacheConfig,

    /// Ad-hoc query settings
    pub query: QueryConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Log filter directive, overridden by `RUST_LOG`
    pub log_filter: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            log_filter: "casecache=info".to_string(),
        }
    }
}

/// Artifact cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached networks (0 = unbounded)
    pub max_entries: usize,

    /// Drop networks not accessed for N seconds (0 = disabled)
    pub idle_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
        }
    }
}

impl CacheConfig {
    /// Runtime eviction policy
    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy {
            max_entries: (self.max_entries > 0).then_some(self.max_entries),
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
        }
    }
}

/// Ad-hoc query configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Script kind used by `query_network`
    pub script_kind: ScriptKind,
}
