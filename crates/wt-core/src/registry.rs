//! Set of live trackers sharing one user.
//!
//! The registry is owned by whoever hosts the trackers and handed to each
//! one at construction. It only ever holds weak references, so a dropped
//! tracker simply stops showing up in snapshots.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::tracker::Tracker;

/// Identity of a tracker within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackerId(u64);

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Concurrent set of live trackers.
#[derive(Default)]
pub struct Registry {
    next_id: AtomicU64,
    trackers: Mutex<HashMap<TrackerId, Weak<Tracker>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocate_id(&self) -> TrackerId {
        TrackerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn insert(&self, id: TrackerId, tracker: Weak<Tracker>) {
        self.trackers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tracker);
    }

    /// Removes a tracker. Returns `false` if it was not registered.
    pub(crate) fn remove(&self, id: TrackerId) -> bool {
        self.trackers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Best-effort copy of the live trackers, in id order.
    ///
    /// The lock is released before returning, so callers can call into the
    /// trackers freely. Trackers registered or removed afterwards are not
    /// reflected.
    pub fn snapshot(&self) -> Vec<Arc<Tracker>> {
        let mut live: Vec<Arc<Tracker>> = self
            .trackers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        live.sort_by_key(|tracker| tracker.id());
        live
    }

    pub fn contains(&self, id: TrackerId) -> bool {
        self.trackers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Number of registered trackers that are still alive.
    pub fn len(&self) -> usize {
        self.trackers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("live", &self.len())
            .finish_non_exhaustive()
    }
}
