//! Error types for casecache
//!
//! All modules use `CaseCacheResult<T>` as their return type.
//!
//! Script failures are deliberately absent from this enum: they are data
//! carried by an [`Artifact`](crate::cache::Artifact), never raised.

use crate::case::NodeId;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for casecache operations
pub type CaseCacheResult<T> = Result<T, CaseCacheError>;

/// All errors that can occur in casecache
///
/// The enum is `Clone` so that a failed resolution cycle can hand the very
/// same error to every caller waiting on it.
#[derive(Error, Debug, Clone)]
pub enum CaseCacheError {
    // Import errors
    #[error("Import of case {node} ({format}) failed: {reason}")]
    ImportFailed {
        node: NodeId,
        format: String,
        reason: String,
    },

    #[error("No importer registered for format '{format}' (case {node})")]
    ImporterNotFound { node: NodeId, format: String },

    // Case graph errors
    #[error("Case not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Parent case not found: {0}")]
    ParentNotFound(NodeId),

    #[error("Case {0} still has dependent cases")]
    NodeHasDependents(NodeId),

    #[error("Case {0} is not a virtual case")]
    NotDerived(NodeId),

    #[error("Case {0} is not an imported case")]
    NotRoot(NodeId),

    // Cache errors
    #[error("Cache invariant violated: {0}")]
    CacheInternal(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigValue { key: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(String),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CaseCacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Create a cache invariant error
    pub fn internal_cache(reason: impl Into<String>) -> Self {
        Self::CacheInternal(reason.into())
    }

    /// Whether this error belongs to the import failure class
    pub fn is_import_failure(&self) -> bool {
        matches!(self, Self::ImportFailed { .. } | Self::ImporterNotFound { .. })
    }

    /// Check if error is retryable
    ///
    /// Import failures are never cached, so the next access re-attempts them.
    pub fn is_retryable(&self) -> bool {
        self.is_import_failure() || matches!(self, Self::Io { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ImporterNotFound { .. } => {
                Some("Register an importer for this format with ImporterRegistry::register")
            }
            Self::NodeHasDependents(_) => Some("Remove the dependent virtual cases first"),
            Self::CacheInternal(_) => Some("This is a bug in casecache, please report it"),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CaseCacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<toml::ser::Error> for CaseCacheError {
    fn from(e: toml::ser::Error) -> Self {
        Self::TomlSerialize(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for CaseCacheError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::CacheInternal(format!("lock poisoned: {}", e))
    }
}
