//! In-memory artifact cache
//!
//! Memoizes the artifact (network, script error, accumulated script output)
//! of every case, keyed by case id. Script failures are cached like any
//! other artifact; import failures are never cached.
//!
//! # Entry States
//!
//! | State | Readers | Leaves on |
//! |-------|---------|-----------|
//! | Absent | first reader starts a resolution | first access |
//! | Resolving | await the shared in-flight resolution | success (Resolved), failure (Absent), invalidation, every caller gone |
//! | Resolved | served from memory | invalidation, capacity or idle eviction |

mod artifact;
pub mod eviction;
mod store;

pub use artifact::{Artifact, ArtifactState};
pub use eviction::{EvictionPolicy, RemovalCause, RemovalListener};
pub use store::{ArtifactCache, EntryInfo, EntryState};
