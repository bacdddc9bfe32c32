//! Case node model

use crate::import::ImportSource;
use crate::script::Script;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a case is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum NodeKind {
    /// Imported case: network comes straight from an importer
    Root(ImportSource),

    /// Virtual case: parent network with a script applied
    Derived { parent: NodeId, script: Script },
}

/// A case in the dependency forest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseNode {
    pub id: NodeId,

    /// Human-readable name
    pub name: String,

    pub kind: NodeKind,
}

impl CaseNode {
    /// Parent case, if this is a virtual case
    pub fn parent(&self) -> Option<NodeId> {
        match &self.kind {
            NodeKind::Root(_) => None,
            NodeKind::Derived { parent, .. } => Some(*parent),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, NodeKind::Root(_))
    }
}
