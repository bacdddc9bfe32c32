//! casecache - Network cache for project cases
//!
//! Lazily materializes the network of imported and virtual (script-derived)
//! cases, memoizes one artifact per case with single-flight resolution, and
//! evicts entries by capacity and idle time. Script failures are recorded
//! as data; import failures are returned as errors and never cached.

pub mod cache;
pub mod case;
pub mod config;
pub mod error;
pub mod import;
pub mod logging;
pub mod network;
pub mod resolve;
pub mod script;
pub mod service;

pub use cache::{Artifact, ArtifactCache, ArtifactState, EvictionPolicy, RemovalCause};
pub use case::{CaseGraph, CaseNode, NodeId, NodeKind};
pub use error::{CaseCacheError, CaseCacheResult};
pub use import::{ImportError, ImportSource, Importer, ImporterRegistry};
pub use network::Network;
pub use script::{Script, ScriptError, ScriptKind, ScriptResult, ScriptRunner};
pub use service::NetworkService;
