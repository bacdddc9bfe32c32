//! Eviction policy and removal notifications

use crate::case::NodeId;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default capacity of the artifact cache
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Default idle timeout of cached artifacts (1 hour)
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

/// When cached artifacts are dropped without being asked to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Capacity bound, least recently accessed entries go first (`None` = unbounded)
    pub max_entries: Option<usize>,

    /// Entries not accessed for this long are dropped (`None` = never)
    pub idle_timeout: Option<Duration>,
}

impl EvictionPolicy {
    /// A policy that never evicts
    pub fn unbounded() -> Self {
        Self {
            max_entries: None,
            idle_timeout: None,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            max_entries: Some(DEFAULT_MAX_ENTRIES),
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
        }
    }
}

/// Why an entry left the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalCause {
    /// Invalidated by a caller
    Explicit,
    /// Evicted to stay within capacity
    Size,
    /// Idle timeout elapsed
    Expired,
}

impl fmt::Display for RemovalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::Size => write!(f, "size"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Observer notified after an entry has been removed
pub type RemovalListener = Arc<dyn Fn(NodeId, RemovalCause) + Send + Sync>;

/// Log removals and forward them to `listener`
///
/// Called with the cache lock released. A panicking listener is logged
/// and otherwise ignored.
pub(crate) fn notify(listener: Option<&RemovalListener>, removals: Vec<(NodeId, RemovalCause)>) {
    for (id, cause) in removals {
        info!("Network of case {} removed ({})", id, cause);

        if let Some(listener) = listener {
            if catch_unwind(AssertUnwindSafe(|| listener(id, cause))).is_err() {
                warn!("Removal listener panicked for case {}", id);
            }
        }
    }
}
