//! Project cases and their dependency forest
//!
//! A case is either imported from raw data (a root) or derived from exactly
//! one parent case by a modification script (a virtual case). Parents must
//! exist before their children are added, so the relation is a forest by
//! construction.

mod graph;
mod node;

pub use graph::CaseGraph;
pub use node::{CaseNode, NodeId, NodeKind};

use std::sync::{Arc, RwLock};

/// Case graph shared between the service and in-flight resolutions
pub type SharedGraph = Arc<RwLock<CaseGraph>>;
