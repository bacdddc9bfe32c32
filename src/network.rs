//! In-memory network handle
//!
//! The electrical model itself lives with the importers and script runners;
//! this crate only moves networks around, clones them before handing them to
//! a script, and stores them in artifacts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Identifier used by the placeholder network of failed artifacts
pub const PLACEHOLDER_NETWORK_ID: &str = "error";

/// A materialized network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Network identifier as set by the importer
    pub id: String,

    /// Format the network was imported from (empty for synthetic networks)
    pub source_format: String,

    /// Opaque model state, owned by importers and scripts
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl Network {
    /// Create an empty network
    pub fn new(id: impl Into<String>, source_format: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_format: source_format.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// The empty network stored in place of a network whose script failed
    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_NETWORK_ID, "")
    }

    /// Set an attribute, returning the previous value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.attributes.insert(key.into(), value.into())
    }

    /// Read an attribute
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}
