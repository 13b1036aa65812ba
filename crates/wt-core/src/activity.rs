//! Inbound activity events.
//!
//! User activity (keys, pointer) goes straight to
//! [`Tracker::notify_activity`](crate::Tracker::notify_activity). Editor
//! content changes are fanned out through an [`ActivityReporter`] only to
//! trackers that enabled auto start.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Callback run when the active editor's content changes.
pub type EditListener = Arc<dyn Fn() + Send + Sync>;

/// Identifies a registered edit listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Source of "active editor content changed" events.
pub trait ActivityReporter: Send + Sync {
    fn add_edit_listener(&self, listener: EditListener) -> ListenerId;
    fn remove_edit_listener(&self, id: ListenerId);
}

/// In-process [`ActivityReporter`] that hosts push edit events into.
#[derive(Default)]
pub struct ActivityHub {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, EditListener)>>,
}

impl ActivityHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers an edit event to every listener and returns how many were called.
    ///
    /// Listeners run after the hub's lock is released, so they may add or
    /// remove listeners themselves.
    pub fn editor_content_changed(&self) -> usize {
        let listeners: Vec<EditListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in &listeners {
            listener();
        }
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ActivityReporter for ActivityHub {
    fn add_edit_listener(&self, listener: EditListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    fn remove_edit_listener(&self, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }
}
