//! Importer abstraction
//!
//! Imported cases are turned into networks by format-specific importers,
//! looked up by format name in an [`ImporterRegistry`].

use crate::case::NodeId;
use crate::error::{CaseCacheError, CaseCacheResult};
use crate::network::Network;
use async_trait::async_trait;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

/// Raw data reference of an imported case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSource {
    /// Importer format name (e.g. "xiidm", "ucte")
    pub format: String,

    /// Where the importer finds the data
    pub location: String,

    /// Importer parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl ImportSource {
    pub fn new(format: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            location: location.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add an importer parameter
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Fatal failure reported by an importer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ImportError(pub String);

/// Builds a network from raw data
#[async_trait]
pub trait Importer: Send + Sync {
    /// Format name this importer handles
    fn format(&self) -> &str;

    /// Import a network from `source`
    async fn import(&self, source: &ImportSource) -> Result<Network, ImportError>;
}

/// Importers keyed by format
#[derive(Clone, Default)]
pub struct ImporterRegistry {
    importers: HashMap<String, Arc<dyn Importer>>,
}

impl ImporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an importer under its own format, replacing any previous one
    pub fn register(&mut self, importer: Arc<dyn Importer>) -> &mut Self {
        self.importers
            .insert(importer.format().to_string(), importer);
        self
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, importer: Arc<dyn Importer>) -> Self {
        self.register(importer);
        self
    }

    pub fn get(&self, format: &str) -> Option<&Arc<dyn Importer>> {
        self.importers.get(format)
    }

    /// Registered formats, sorted
    pub fn formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = self.importers.keys().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }

    /// Import the network of case `node`
    pub async fn import(&self, node: NodeId, source: &ImportSource) -> CaseCacheResult<Network> {
        let importer = self
            .get(&source.format)
            .ok_or_else(|| CaseCacheError::ImporterNotFound {
                node,
                format: source.format.clone(),
            })?;

        let imported = AssertUnwindSafe(importer.import(source))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(ImportError("importer aborted unexpectedly".to_string())));

        imported.map_err(|e| CaseCacheError::ImportFailed {
            node,
            format: source.format.clone(),
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for ImporterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImporterRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}
