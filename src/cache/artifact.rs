//! Materialized result of a case

use crate::network::Network;
use crate::script::ScriptError;
use std::sync::Arc;

/// Network of an artifact, or the failure that replaced it
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactState {
    /// The network was imported, and every script of the chain succeeded
    Ready(Arc<Network>),

    /// A script of the chain failed; `placeholder` stands in for the network
    Failed {
        error: ScriptError,
        placeholder: Arc<Network>,
    },
}

/// Network, script error and accumulated script output of a case
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    state: ArtifactState,
    output: String,
}

impl Artifact {
    /// Artifact of an imported case
    pub fn imported(network: Network) -> Self {
        Self {
            state: ArtifactState::Ready(Arc::new(network)),
            output: String::new(),
        }
    }

    /// Artifact of a successful script step
    pub fn modified(network: Network, parent_output: &str, step_output: &str) -> Self {
        Self {
            state: ArtifactState::Ready(Arc::new(network)),
            output: concat(parent_output, step_output),
        }
    }

    /// Artifact of a failed script step
    pub fn failed(error: ScriptError, parent_output: &str, step_output: &str) -> Self {
        Self {
            state: ArtifactState::Failed {
                error,
                placeholder: Arc::new(Network::placeholder()),
            },
            output: concat(parent_output, step_output),
        }
    }

    pub fn state(&self) -> &ArtifactState {
        &self.state
    }

    /// The network, or the placeholder if the chain failed
    pub fn network(&self) -> &Arc<Network> {
        match &self.state {
            ArtifactState::Ready(network) => network,
            ArtifactState::Failed { placeholder, .. } => placeholder,
        }
    }

    pub fn error(&self) -> Option<&ScriptError> {
        match &self.state {
            ArtifactState::Ready(_) => None,
            ArtifactState::Failed { error, .. } => Some(error),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, ArtifactState::Failed { .. })
    }

    /// Output of every script from the root down to this case
    pub fn output(&self) -> &str {
        &self.output
    }
}

fn concat(parent_output: &str, step_output: &str) -> String {
    let mut output = String::with_capacity(parent_output.len() + step_output.len());
    output.push_str(parent_output);
    output.push_str(step_output);
    output
}
