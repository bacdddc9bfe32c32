//! Script runner abstraction
//!
//! Scripts are executed by an external runtime behind the [`ScriptRunner`]
//! trait. Script-level failures are reported inside [`ScriptResult`] and are
//! never raised.

use crate::network::Network;
use async_trait::async_trait;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::panic::AssertUnwindSafe;
use thiserror::Error;

/// Language a script is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    #[default]
    Groovy,
    Python,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Groovy => write!(f, "groovy"),
            Self::Python => write!(f, "python"),
        }
    }
}

/// A modification script attached to a virtual case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    pub kind: ScriptKind,
    pub content: String,
}

impl Script {
    pub fn new(name: impl Into<String>, kind: ScriptKind, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            content: content.into(),
        }
    }

    /// Groovy script, the default kind
    pub fn groovy(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(name, ScriptKind::Groovy, content)
    }
}

/// Position of a script error in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptLocation {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// Structured error reported by a script run
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ScriptError {
    pub message: String,

    /// Where in the script the error was raised, when the runtime knows
    pub location: Option<ScriptLocation>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub fn at(message: impl Into<String>, location: ScriptLocation) -> Self {
        Self {
            message: message.into(),
            location: Some(location),
        }
    }
}

/// Raw result of a script run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptResult {
    /// Value returned by the script, if any
    pub value: Option<Value>,

    /// Everything the script printed
    pub output: String,

    /// Set when the script failed
    pub error: Option<ScriptError>,
}

impl ScriptResult {
    pub fn success(value: Option<Value>, output: impl Into<String>) -> Self {
        Self {
            value,
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(error: ScriptError, output: impl Into<String>) -> Self {
        Self {
            value: None,
            output: output.into(),
            error: Some(error),
        }
    }

    /// Normalize the runner's answer into success or failure
    ///
    /// A result carrying both a value and an error is ambiguous and is
    /// reported as a generic script error.
    pub fn into_outcome(self) -> ScriptOutcome {
        match (self.value, self.error) {
            (Some(_), Some(_)) => ScriptOutcome::Failed {
                error: ScriptError::new("script runner returned both a value and an error"),
                output: self.output,
            },
            (_, Some(error)) => ScriptOutcome::Failed {
                error,
                output: self.output,
            },
            (value, None) => ScriptOutcome::Succeeded {
                value,
                output: self.output,
            },
        }
    }
}

/// Normalized script result
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptOutcome {
    Succeeded { value: Option<Value>, output: String },
    Failed { error: ScriptError, output: String },
}

/// Executes scripts against a network
///
/// Implementations mutate `network` in place. They must report script
/// failures through [`ScriptResult::error`] rather than panicking.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, network: &mut Network, kind: ScriptKind, script: &str) -> ScriptResult;
}

/// Run a script, turning a panicking runner into a script error
pub async fn run_guarded(
    runner: &dyn ScriptRunner,
    network: &mut Network,
    kind: ScriptKind,
    script: &str,
) -> ScriptOutcome {
    match AssertUnwindSafe(runner.run(network, kind, script))
        .catch_unwind()
        .await
    {
        Ok(result) => result.into_outcome(),
        Err(_) => ScriptOutcome::Failed {
            error: ScriptError::new("script runner aborted unexpectedly"),
            output: String::new(),
        },
    }
}
