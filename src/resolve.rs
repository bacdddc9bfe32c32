//! Case resolution
//!
//! Turns a case into its artifact. Imported cases go through their importer;
//! virtual cases apply their script to a copy of the parent's network.
//! A failed parent is passed down unchanged and the child's script never runs.

use crate::cache::{Artifact, ArtifactCache};
use crate::case::{CaseNode, NodeId, NodeKind, SharedGraph};
use crate::error::{CaseCacheError, CaseCacheResult};
use crate::import::ImporterRegistry;
use crate::script::{self, ScriptOutcome, ScriptRunner};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Computes case artifacts from importers and a script runner
pub struct Resolver {
    graph: SharedGraph,
    importers: ImporterRegistry,
    runner: Arc<dyn ScriptRunner>,
}

impl Resolver {
    pub fn new(
        graph: SharedGraph,
        importers: ImporterRegistry,
        runner: Arc<dyn ScriptRunner>,
    ) -> Self {
        Self {
            graph,
            importers,
            runner,
        }
    }

    pub fn runner(&self) -> &dyn ScriptRunner {
        self.runner.as_ref()
    }

    /// Resolve a single case given its parent's artifact
    ///
    /// Import failures are returned as errors; script failures become a
    /// failed artifact.
    pub async fn resolve(
        &self,
        node: &CaseNode,
        parent: Option<&Artifact>,
    ) -> CaseCacheResult<Artifact> {
        match (&node.kind, parent) {
            (NodeKind::Root(source), _) => {
                info!("Loading network of case {}", node.id);
                let network = self.importers.import(node.id, source).await?;
                Ok(Artifact::imported(network))
            }
            (NodeKind::Derived { parent, .. }, None) => Err(CaseCacheError::internal_cache(
                format!(
                    "virtual case {} resolved without the artifact of its parent {}",
                    node.id, parent
                ),
            )),
            (NodeKind::Derived { .. }, Some(parent)) if parent.is_failed() => {
                debug!("Parent of case {} failed, skipping its script", node.id);
                Ok(parent.clone())
            }
            (NodeKind::Derived { script, .. }, Some(parent)) => {
                info!(
                    "Applying script '{}' to network of case {}",
                    script.name, node.id
                );

                // Scripts mutate in place; the parent's cached network stays untouched
                let mut network = parent.network().as_ref().clone();
                match script::run_guarded(
                    self.runner.as_ref(),
                    &mut network,
                    script.kind,
                    &script.content,
                )
                .await
                {
                    ScriptOutcome::Succeeded { output, .. } => {
                        Ok(Artifact::modified(network, parent.output(), &output))
                    }
                    ScriptOutcome::Failed { error, output } => {
                        warn!("Script '{}' of case {} failed: {}", script.name, node.id, error);
                        Ok(Artifact::failed(error, parent.output(), &output))
                    }
                }
            }
        }
    }

    /// Resolve case `id` through `cache`
    ///
    /// The walk goes up the lineage of `id` and stops at the nearest case the
    /// cache already holds (or the root), then resolves downwards one cache
    /// key at a time, so every ancestor is computed at most once per
    /// resolution cycle and chain depth never turns into call depth.
    pub async fn materialize(
        self: &Arc<Self>,
        cache: &ArtifactCache,
        id: NodeId,
    ) -> CaseCacheResult<Artifact> {
        let lineage: Vec<NodeId> = self
            .graph
            .read()?
            .lineage(id)?
            .iter()
            .map(|node| node.id)
            .collect();
        let Some(&root) = lineage.last() else {
            return Err(CaseCacheError::internal_cache("empty case lineage"));
        };

        loop {
            let mut nearest = None;
            for (index, node) in lineage.iter().enumerate() {
                if cache.contains(*node)? {
                    nearest = Some(index);
                    break;
                }
            }

            let (top, mut artifact) = match nearest {
                Some(index) => match cache.get(lineage[index]).await? {
                    Some(artifact) => (index, artifact),
                    None => {
                        debug!(
                            "Case {} left the cache during resolution, restarting",
                            lineage[index]
                        );
                        continue;
                    }
                },
                None => (lineage.len() - 1, self.step(cache, root, None).await?),
            };

            for node in lineage[..top].iter().rev() {
                artifact = self.step(cache, *node, Some(artifact)).await?;
            }
            return Ok(artifact);
        }
    }

    /// Resolve one case through `cache`
    ///
    /// The case definition is read from the graph when the resolution cycle
    /// first runs, after its cache entry exists. An edit landing before that
    /// read is picked up; one landing after it finds the entry to invalidate.
    async fn step(
        self: &Arc<Self>,
        cache: &ArtifactCache,
        id: NodeId,
        parent: Option<Artifact>,
    ) -> CaseCacheResult<Artifact> {
        cache
            .get_or_compute(id, || {
                let resolver = Arc::clone(self);
                async move {
                    let node = resolver.graph.read()?.get(id)?.clone();
                    resolver.resolve(&node, parent.as_ref()).await
                }
            })
            .await
    }
}
