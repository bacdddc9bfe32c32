//! Network service
//!
//! Entry point for consumers: owns the case graph and the artifact cache and
//! answers network, script error, script output and ad-hoc query requests.

use crate::cache::{Artifact, ArtifactCache, RemovalListener};
use crate::case::{CaseGraph, CaseNode, NodeId, SharedGraph};
use crate::config::Config;
use crate::error::CaseCacheResult;
use crate::import::{ImportSource, ImporterRegistry};
use crate::network::Network;
use crate::resolve::Resolver;
use crate::script::{self, Script, ScriptError, ScriptKind, ScriptOutcome, ScriptRunner};
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

/// Cached access to the networks of project cases
pub struct NetworkService {
    graph: SharedGraph,
    cache: ArtifactCache,
    resolver: Arc<Resolver>,
    query_kind: ScriptKind,
}

impl NetworkService {
    /// Create a service over `graph`, configured from `config`
    pub fn new(
        graph: CaseGraph,
        importers: ImporterRegistry,
        runner: Arc<dyn ScriptRunner>,
        config: &Config,
    ) -> Self {
        let graph = Arc::new(RwLock::new(graph));
        Self {
            resolver: Arc::new(Resolver::new(Arc::clone(&graph), importers, runner)),
            graph,
            cache: ArtifactCache::new(config.cache.eviction_policy()),
            query_kind: config.query.script_kind,
        }
    }

    /// Observe cache removals
    pub fn with_removal_listener(mut self, listener: RemovalListener) -> Self {
        self.cache = self.cache.with_listener(listener);
        self
    }

    /// The underlying cache, for diagnostics
    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    // Case graph maintenance

    /// Add an imported case
    pub fn add_imported_case(
        &self,
        name: impl Into<String>,
        source: ImportSource,
    ) -> CaseCacheResult<NodeId> {
        Ok(self.graph.write()?.add_root(name, source))
    }

    /// Add a virtual case deriving from `parent`
    pub fn add_virtual_case(
        &self,
        name: impl Into<String>,
        parent: NodeId,
        script: Script,
    ) -> CaseCacheResult<NodeId> {
        self.graph.write()?.add_derived(name, parent, script)
    }

    pub fn case(&self, id: NodeId) -> CaseCacheResult<CaseNode> {
        Ok(self.graph.read()?.get(id)?.clone())
    }

    /// Replace the script of a virtual case and drop its cached network
    ///
    /// Dependent cases keep their cached networks until invalidated.
    pub fn update_script(&self, id: NodeId, script: Script) -> CaseCacheResult<()> {
        self.graph.write()?.update_script(id, script)?;
        self.invalidate_cache(id)
    }

    /// Replace the import source of an imported case and drop its cached network
    ///
    /// Dependent cases keep their cached networks until invalidated.
    pub fn update_source(&self, id: NodeId, source: ImportSource) -> CaseCacheResult<()> {
        self.graph.write()?.update_source(id, source)?;
        self.invalidate_cache(id)
    }

    /// Remove a case nothing depends on
    pub fn remove_case(&self, id: NodeId) -> CaseCacheResult<CaseNode> {
        let node = self.graph.write()?.remove(id)?;
        self.invalidate_cache(id)?;
        Ok(node)
    }

    // Artifact queries

    async fn artifact(&self, id: NodeId) -> CaseCacheResult<Artifact> {
        self.resolver.materialize(&self.cache, id).await
    }

    /// Network of case `id`; the placeholder network if a script failed
    pub async fn get_network(&self, id: NodeId) -> CaseCacheResult<Arc<Network>> {
        Ok(Arc::clone(self.artifact(id).await?.network()))
    }

    /// Script error of case `id` or of the first failed ancestor
    pub async fn get_script_error(&self, id: NodeId) -> CaseCacheResult<Option<ScriptError>> {
        Ok(self.artifact(id).await?.error().cloned())
    }

    /// Output of every script from the root down to case `id`
    pub async fn get_script_output(&self, id: NodeId) -> CaseCacheResult<String> {
        Ok(self.artifact(id).await?.output().to_string())
    }

    /// Drop the cached network of case `id` only
    pub fn invalidate_cache(&self, id: NodeId) -> CaseCacheResult<()> {
        if self.cache.invalidate(id)? {
            debug!("Invalidated cached network of case {}", id);
        }
        Ok(())
    }

    /// Drop the cached network of case `id` and of every case depending on it
    pub fn invalidate_cache_cascading(&self, id: NodeId) -> CaseCacheResult<()> {
        let descendants = {
            let graph = self.graph.read()?;
            graph.get(id)?;
            graph.descendants(id)
        };

        self.invalidate_cache(id)?;
        for descendant in descendants {
            self.invalidate_cache(descendant)?;
        }
        Ok(())
    }

    /// Run an ad-hoc script against the network of case `id`
    ///
    /// Returns the script's value as JSON, or `None` if it returned nothing
    /// or failed. The script runs on a copy: the cached network is untouched.
    pub async fn query_network(&self, id: NodeId, script: &str) -> CaseCacheResult<Option<String>> {
        self.query_network_with(id, self.query_kind, script).await
    }

    /// [`query_network`](Self::query_network) with an explicit script kind
    pub async fn query_network_with(
        &self,
        id: NodeId,
        kind: ScriptKind,
        script: &str,
    ) -> CaseCacheResult<Option<String>> {
        let mut network = self.get_network(id).await?.as_ref().clone();

        match script::run_guarded(self.resolver.runner(), &mut network, kind, script).await {
            ScriptOutcome::Succeeded { value: Some(value), .. } => {
                Ok(Some(serde_json::to_string(&value)?))
            }
            ScriptOutcome::Succeeded { value: None, .. } => Ok(None),
            ScriptOutcome::Failed { error, .. } => {
                error!("Network query error on case {}: {}", id, error);
                Ok(None)
            }
        }
    }
}
