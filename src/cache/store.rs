//! Single-flight artifact store

use crate::cache::artifact::Artifact;
use crate::cache::eviction::{self, EvictionPolicy, RemovalCause, RemovalListener};
use crate::case::NodeId;
use crate::error::{CaseCacheError, CaseCacheResult};
use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

type Resolution = Shared<BoxFuture<'static, CaseCacheResult<Artifact>>>;

type Removals = Vec<(NodeId, RemovalCause)>;

/// Resolution state of a cached key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Resolving,
    Resolved,
}

/// Diagnostic view of a cache entry
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub id: NodeId,
    pub state: EntryState,

    /// When the artifact was stored (`None` while resolving)
    pub resolved_at: Option<DateTime<Utc>>,

    /// Time since last access
    pub idle: Duration,
}

enum Slot {
    Resolving(Resolution),
    Resolved {
        artifact: Artifact,
        resolved_at: DateTime<Utc>,
    },
}

struct Entry {
    slot: Slot,

    /// Identifies the resolution cycle that created this entry
    generation: u64,

    last_access: Instant,
}

#[derive(Default)]
struct Entries {
    map: HashMap<NodeId, Entry>,
    next_generation: u64,
}

enum Lookup {
    Ready(Artifact),
    Pending(Resolution, u64),
    Missing,
}

/// Memoizing store of case artifacts
///
/// Each key holds at most one in-flight resolution, shared by every caller
/// asking for that key while it runs. Resolutions that fail are never
/// stored, and a resolution whose entry was invalidated or evicted while
/// running hands its result to its waiters without writing it back.
pub struct ArtifactCache {
    policy: EvictionPolicy,
    listener: Option<RemovalListener>,
    entries: Mutex<Entries>,
}

impl ArtifactCache {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            listener: None,
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Observe removals (invalidation, capacity and idle eviction)
    pub fn with_listener(mut self, listener: RemovalListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Return the artifact of `id`, running `compute` if no entry exists
    ///
    /// `compute` is only called when this caller starts a new resolution
    /// cycle. Concurrent callers for the same key await that cycle.
    pub async fn get_or_compute<F, Fut>(&self, id: NodeId, compute: F) -> CaseCacheResult<Artifact>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CaseCacheResult<Artifact>> + Send + 'static,
    {
        let mut removals = Vec::new();
        let lookup = {
            let mut entries = self.lock()?;
            let now = Instant::now();
            self.expire(&mut entries, now, &mut removals);

            match Self::touch(&mut entries, id, now) {
                Lookup::Missing => {
                    debug!("Cache miss for case {}", id);
                    let generation = entries.next_generation;
                    entries.next_generation += 1;

                    let resolution = compute().boxed().shared();
                    entries.map.insert(
                        id,
                        Entry {
                            slot: Slot::Resolving(resolution.clone()),
                            generation,
                            last_access: now,
                        },
                    );
                    self.enforce_capacity(&mut entries, id, &mut removals);
                    Lookup::Pending(resolution, generation)
                }
                found => found,
            }
        };
        eviction::notify(self.listener.as_ref(), removals);

        self.settle(id, lookup)
            .await
            .unwrap_or_else(|| Err(CaseCacheError::internal_cache("resolution vanished")))
    }

    /// Return the artifact of `id` if it is cached or being resolved
    pub async fn get(&self, id: NodeId) -> CaseCacheResult<Option<Artifact>> {
        let mut removals = Vec::new();
        let lookup = {
            let mut entries = self.lock()?;
            let now = Instant::now();
            self.expire(&mut entries, now, &mut removals);
            Self::touch(&mut entries, id, now)
        };
        eviction::notify(self.listener.as_ref(), removals);

        self.settle(id, lookup).await.transpose()
    }

    /// Whether `id` is cached or being resolved, without counting as an access
    pub fn contains(&self, id: NodeId) -> CaseCacheResult<bool> {
        let mut removals = Vec::new();
        let found = {
            let mut entries = self.lock()?;
            self.expire(&mut entries, Instant::now(), &mut removals);
            entries.map.contains_key(&id)
        };
        eviction::notify(self.listener.as_ref(), removals);
        Ok(found)
    }

    /// Drop the entry of `id`, returning whether one existed
    ///
    /// Dependent cases keep their own entries.
    pub fn invalidate(&self, id: NodeId) -> CaseCacheResult<bool> {
        let removed = self.lock()?.map.remove(&id).is_some();
        if removed {
            eviction::notify(self.listener.as_ref(), vec![(id, RemovalCause::Explicit)]);
        }
        Ok(removed)
    }

    /// Drop every entry
    pub fn invalidate_all(&self) -> CaseCacheResult<usize> {
        let removals: Removals = self
            .lock()?
            .map
            .drain()
            .map(|(id, _)| (id, RemovalCause::Explicit))
            .collect();
        let count = removals.len();
        eviction::notify(self.listener.as_ref(), removals);
        Ok(count)
    }

    /// Drop entries whose idle timeout has elapsed, returning how many
    ///
    /// Resolutions no caller awaits anymore are dropped too, uncounted.
    pub fn purge_expired(&self) -> CaseCacheResult<usize> {
        let mut removals = Vec::new();
        {
            let mut entries = self.lock()?;
            self.expire(&mut entries, Instant::now(), &mut removals);
        }
        let count = removals.len();
        eviction::notify(self.listener.as_ref(), removals);
        Ok(count)
    }

    /// Number of live entries, resolving ones included
    pub fn len(&self) -> CaseCacheResult<usize> {
        self.purge_expired()?;
        Ok(self.lock()?.map.len())
    }

    pub fn is_empty(&self) -> CaseCacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Snapshot of every entry, most recently accessed first
    pub fn entries(&self) -> CaseCacheResult<Vec<EntryInfo>> {
        let entries = self.lock()?;
        let now = Instant::now();
        let mut infos: Vec<EntryInfo> = entries
            .map
            .iter()
            .map(|(id, entry)| {
                let (state, resolved_at) = match &entry.slot {
                    Slot::Resolving(_) => (EntryState::Resolving, None),
                    Slot::Resolved { resolved_at, .. } => {
                        (EntryState::Resolved, Some(*resolved_at))
                    }
                };
                EntryInfo {
                    id: *id,
                    state,
                    resolved_at,
                    idle: now.saturating_duration_since(entry.last_access),
                }
            })
            .collect();
        infos.sort_by_key(|info| info.idle);
        Ok(infos)
    }

    fn lock(&self) -> CaseCacheResult<MutexGuard<'_, Entries>> {
        Ok(self.entries.lock()?)
    }

    fn touch(entries: &mut Entries, id: NodeId, now: Instant) -> Lookup {
        match entries.map.get_mut(&id) {
            Some(entry) => {
                entry.last_access = now;
                match &entry.slot {
                    Slot::Resolved { artifact, .. } => {
                        debug!("Cache hit for case {}", id);
                        Lookup::Ready(artifact.clone())
                    }
                    Slot::Resolving(resolution) => {
                        debug!("Awaiting in-flight resolution of case {}", id);
                        Lookup::Pending(resolution.clone(), entry.generation)
                    }
                }
            }
            None => Lookup::Missing,
        }
    }

    /// Await a pending resolution and record its outcome
    async fn settle(&self, id: NodeId, lookup: Lookup) -> Option<CaseCacheResult<Artifact>> {
        match lookup {
            Lookup::Ready(artifact) => Some(Ok(artifact)),
            Lookup::Pending(resolution, generation) => {
                let result = resolution.await;
                if let Err(e) = self.complete(id, generation, &result) {
                    return Some(Err(e));
                }
                Some(result)
            }
            Lookup::Missing => None,
        }
    }

    /// Store the result of cycle `generation`, unless it was superseded
    fn complete(
        &self,
        id: NodeId,
        generation: u64,
        result: &CaseCacheResult<Artifact>,
    ) -> CaseCacheResult<()> {
        let mut removals = Vec::new();
        {
            let mut entries = self.lock()?;
            let pending = matches!(
                entries.map.get(&id),
                Some(Entry { slot: Slot::Resolving(_), generation: g, .. }) if *g == generation
            );
            if !pending {
                return Ok(());
            }

            match result {
                Ok(artifact) => {
                    if let Some(entry) = entries.map.get_mut(&id) {
                        entry.slot = Slot::Resolved {
                            artifact: artifact.clone(),
                            resolved_at: Utc::now(),
                        };
                        entry.last_access = Instant::now();
                    }
                    self.enforce_capacity(&mut entries, id, &mut removals);
                }
                Err(e) => {
                    entries.map.remove(&id);
                    debug!("Resolution of case {} failed, not cached: {}", id, e);
                }
            }
        }
        eviction::notify(self.listener.as_ref(), removals);
        Ok(())
    }

    fn expire(&self, entries: &mut Entries, now: Instant, removals: &mut Removals) {
        // A resolution only the entry still holds has lost all its callers
        // and will never be polled again
        entries.map.retain(|id, entry| match &entry.slot {
            Slot::Resolving(resolution) if resolution.strong_count() == Some(1) => {
                debug!("Dropping abandoned resolution of case {}", id);
                false
            }
            _ => true,
        });

        let Some(idle_timeout) = self.policy.idle_timeout else {
            return;
        };

        let expired: Vec<NodeId> = entries
            .map
            .iter()
            .filter(|(_, entry)| {
                matches!(entry.slot, Slot::Resolved { .. })
                    && now.saturating_duration_since(entry.last_access) >= idle_timeout
            })
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            entries.map.remove(&id);
            removals.push((id, RemovalCause::Expired));
        }
    }

    /// Evict least recently accessed resolved entries until within capacity
    ///
    /// `keep` is the key being accessed and is never chosen. Resolving
    /// entries are not evicted, so the cache may briefly exceed capacity.
    fn enforce_capacity(&self, entries: &mut Entries, keep: NodeId, removals: &mut Removals) {
        let Some(max_entries) = self.policy.max_entries else {
            return;
        };

        while entries.map.len() > max_entries {
            let victim = entries
                .map
                .iter()
                .filter(|(id, entry)| **id != keep && matches!(entry.slot, Slot::Resolved { .. }))
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(id, _)| *id);

            let Some(victim) = victim else {
                break;
            };
            entries.map.remove(&victim);
            removals.push((victim, RemovalCause::Size));
        }
    }
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("policy", &self.policy)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}
