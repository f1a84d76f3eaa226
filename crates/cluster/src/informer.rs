//! Pod watch cache.
//!
//! [`PodInformer`] turns the raw list/watch stream ([`WatchEvent`]) into
//! [`PodEvent`]s with old and new snapshots, keeping a [`PodCache`] that
//! handlers can read for cross-pod checks.
//!
//! ```text
//! Init → InitApply* → InitDone   (initial list, emits Synced once)
//! Apply / Delete                  (steady state, emits Added/Updated/Deleted)
//! Init → InitApply* → InitDone   (re-list after desync, emits the diff)
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sbomsync_core::types::{PodKey, PodSnapshot};

/// Raw event from the cluster list/watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A (re-)list started.
    Init,
    /// A pod seen during a (re-)list.
    InitApply(PodSnapshot),
    /// The (re-)list finished.
    InitDone,
    /// A pod was created or modified.
    Apply(PodSnapshot),
    /// A pod was deleted.
    Delete(PodSnapshot),
}

/// Event delivered to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodEvent {
    /// A pod appeared.
    Added(PodSnapshot),
    /// A pod changed.
    Updated {
        /// Previous snapshot
        old: PodSnapshot,
        /// Current snapshot
        new: PodSnapshot,
    },
    /// A pod disappeared. Carries the last known snapshot.
    Deleted(PodSnapshot),
    /// The initial list completed. Emitted once.
    Synced,
}

impl PodEvent {
    /// Key of the pod this event concerns.
    pub fn pod_key(&self) -> Option<PodKey> {
        match self {
            Self::Added(pod) | Self::Deleted(pod) => Some(pod.key()),
            Self::Updated { new, .. } => Some(new.key()),
            Self::Synced => None,
        }
    }
}

/// Shared, read-mostly view of the currently known pods.
#[derive(Debug, Clone, Default)]
pub struct PodCache {
    inner: Arc<RwLock<HashMap<PodKey, PodSnapshot>>>,
}

impl PodCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies every cached pod.
    pub fn snapshot(&self) -> Vec<PodSnapshot> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.values().cloned().collect()
    }

    /// Number of cached pods.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up one pod.
    pub fn get(&self, key: &PodKey) -> Option<PodSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn insert(&self, pod: PodSnapshot) -> Option<PodSnapshot> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pod.key(), pod)
    }

    fn remove(&self, key: &PodKey) -> Option<PodSnapshot> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
    }

    fn replace(&self, pods: HashMap<PodKey, PodSnapshot>) -> HashMap<PodKey, PodSnapshot> {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *map, pods)
    }
}

/// Folds raw watch events into the cache and emits pod events.
#[derive(Debug, Default)]
pub struct PodInformer {
    cache: PodCache,
    pending: Option<HashMap<PodKey, PodSnapshot>>,
    synced: bool,
}

impl PodInformer {
    /// Creates an informer over a fresh cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the cache.
    pub fn cache(&self) -> PodCache {
        self.cache.clone()
    }

    /// Whether the initial list has completed.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Applies one raw event. The cache is updated before the returned
    /// events are handed out.
    pub fn apply(&mut self, event: WatchEvent) -> Vec<PodEvent> {
        match event {
            WatchEvent::Init => {
                self.pending = Some(HashMap::new());
                Vec::new()
            }
            WatchEvent::InitApply(pod) => {
                self.pending
                    .get_or_insert_with(HashMap::new)
                    .insert(pod.key(), pod);
                Vec::new()
            }
            WatchEvent::InitDone => {
                let fresh = self.pending.take().unwrap_or_default();
                let previous = self.cache.replace(fresh.clone());
                if !self.synced {
                    self.synced = true;
                    return vec![PodEvent::Synced];
                }
                relist_diff(previous, fresh)
            }
            WatchEvent::Apply(pod) => match self.cache.insert(pod.clone()) {
                Some(old) if old == pod => Vec::new(),
                Some(old) => vec![PodEvent::Updated { old, new: pod }],
                None => vec![PodEvent::Added(pod)],
            },
            WatchEvent::Delete(pod) => {
                let last = self.cache.remove(&pod.key()).unwrap_or(pod);
                vec![PodEvent::Deleted(last)]
            }
        }
    }
}

fn relist_diff(
    mut previous: HashMap<PodKey, PodSnapshot>,
    fresh: HashMap<PodKey, PodSnapshot>,
) -> Vec<PodEvent> {
    let mut events = Vec::new();
    for (key, new) in fresh {
        match previous.remove(&key) {
            Some(old) if old == new => {}
            Some(old) => events.push(PodEvent::Updated { old, new }),
            None => events.push(PodEvent::Added(new)),
        }
    }
    events.extend(previous.into_values().map(PodEvent::Deleted));
    events
}
