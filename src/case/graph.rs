//! Case dependency forest

use crate::case::node::{CaseNode, NodeId, NodeKind};
use crate::error::{CaseCacheError, CaseCacheResult};
use crate::import::ImportSource;
use crate::script::Script;
use std::collections::{HashMap, VecDeque};

/// The set of cases and their parent edges
#[derive(Debug, Clone, Default)]
pub struct CaseGraph {
    nodes: HashMap<NodeId, CaseNode>,
    children: HashMap<NodeId, Vec<NodeId>>,
}

impl CaseGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an imported case
    pub fn add_root(&mut self, name: impl Into<String>, source: ImportSource) -> NodeId {
        let id = NodeId::new();
        self.nodes.insert(
            id,
            CaseNode {
                id,
                name: name.into(),
                kind: NodeKind::Root(source),
            },
        );
        id
    }

    /// Add a virtual case on top of `parent`
    pub fn add_derived(
        &mut self,
        name: impl Into<String>,
        parent: NodeId,
        script: Script,
    ) -> CaseCacheResult<NodeId> {
        if !self.nodes.contains_key(&parent) {
            return Err(CaseCacheError::ParentNotFound(parent));
        }

        let id = NodeId::new();
        self.nodes.insert(
            id,
            CaseNode {
                id,
                name: name.into(),
                kind: NodeKind::Derived { parent, script },
            },
        );
        self.children.entry(parent).or_default().push(id);
        Ok(id)
    }

    pub fn get(&self, id: NodeId) -> CaseCacheResult<&CaseNode> {
        self.nodes.get(&id).ok_or(CaseCacheError::NodeNotFound(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct dependents of `id`
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every case that depends on `id`, breadth-first, excluding `id`
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut queue: VecDeque<NodeId> = self.children(id).iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            found.push(next);
            queue.extend(self.children(next).iter().copied());
        }
        found
    }

    /// `id` followed by its ancestors up to and including the root
    pub fn lineage(&self, id: NodeId) -> CaseCacheResult<Vec<CaseNode>> {
        let mut lineage = Vec::new();
        let mut current = Some(id);

        while let Some(node_id) = current {
            // Cannot happen for graphs built through this API
            if lineage.len() > self.nodes.len() {
                return Err(CaseCacheError::internal_cache(format!(
                    "cycle detected in the ancestry of case {}",
                    id
                )));
            }

            let node = self.nodes.get(&node_id).ok_or_else(|| {
                if node_id == id {
                    CaseCacheError::NodeNotFound(id)
                } else {
                    CaseCacheError::ParentNotFound(node_id)
                }
            })?;
            current = node.parent();
            lineage.push(node.clone());
        }

        Ok(lineage)
    }

    /// Replace the script of a virtual case
    pub fn update_script(&mut self, id: NodeId, script: Script) -> CaseCacheResult<()> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(CaseCacheError::NodeNotFound(id))?;
        match &mut node.kind {
            NodeKind::Derived { script: current, .. } => {
                *current = script;
                Ok(())
            }
            NodeKind::Root(_) => Err(CaseCacheError::NotDerived(id)),
        }
    }

    /// Replace the import source of an imported case
    pub fn update_source(&mut self, id: NodeId, source: ImportSource) -> CaseCacheResult<()> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(CaseCacheError::NodeNotFound(id))?;
        match &mut node.kind {
            NodeKind::Root(current) => {
                *current = source;
                Ok(())
            }
            NodeKind::Derived { .. } => Err(CaseCacheError::NotRoot(id)),
        }
    }

    /// Remove a case that nothing depends on
    pub fn remove(&mut self, id: NodeId) -> CaseCacheResult<CaseNode> {
        if !self.children(id).is_empty() {
            return Err(CaseCacheError::NodeHasDependents(id));
        }

        let node = self
            .nodes
            .remove(&id)
            .ok_or(CaseCacheError::NodeNotFound(id))?;
        self.children.remove(&id);

        if let Some(parent) = node.parent() {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.retain(|child| *child != id);
                if siblings.is_empty() {
                    self.children.remove(&parent);
                }
            }
        }

        Ok(node)
    }
}
