//! Tracing setup for applications embedding casecache

use crate::config::GeneralConfig;
use crate::error::{CaseCacheError, CaseCacheResult};
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Parse the configured format name
    pub fn parse(name: &str) -> CaseCacheResult<Self> {
        match name {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CaseCacheError::ConfigValue {
                key: "general.log_format".to_string(),
                reason: format!("unknown format '{}', expected \"text\" or \"json\"", other),
            }),
        }
    }
}

/// Install a global tracing subscriber writing to stderr
///
/// `RUST_LOG` takes precedence over the configured filter. Fails if a
/// global subscriber is already installed.
pub fn init(config: &GeneralConfig) -> CaseCacheResult<()> {
    let format = LogFormat::parse(&config.log_format)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| CaseCacheError::Internal(format!("installing log subscriber: {}", e)))
}
