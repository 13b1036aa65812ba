//! Outbound collaborator contracts: idle-gap notifications and display refresh.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::format::millis_to_string;
use crate::tracker::Tracker;

/// Emitted when a tracker leaves IDLE after a gap too long to count silently.
#[derive(Debug, Clone)]
pub struct IdleGap {
    duration_ms: i64,
    ack: CountInAck,
}

impl IdleGap {
    pub(crate) fn new(tracker: Weak<Tracker>, duration_ms: i64) -> Self {
        Self {
            duration_ms,
            ack: CountInAck {
                tracker,
                duration_ms,
                primed: Arc::new(AtomicBool::new(true)),
            },
        }
    }

    /// How long the tracker was idle.
    pub const fn duration_ms(&self) -> i64 {
        self.duration_ms
    }

    /// The "count this time in" action attached to this gap.
    pub fn ack(&self) -> &CountInAck {
        &self.ack
    }

    /// Consumes the event, keeping only the action.
    pub fn into_ack(self) -> CountInAck {
        self.ack
    }

    /// Notification text, e.g. `Gone for 5m 0s`.
    pub fn message(&self) -> String {
        format!("Gone for {}", millis_to_string(self.duration_ms))
    }
}

/// Single-shot action that folds an idle gap into the tracker's total.
///
/// Clones share one flag: whichever clone fires first counts the time and
/// every later call does nothing.
#[derive(Clone)]
pub struct CountInAck {
    tracker: Weak<Tracker>,
    duration_ms: i64,
    primed: Arc<AtomicBool>,
}

impl CountInAck {
    /// Counts the gap in. Returns `true` only for the call that had an effect.
    pub fn count_in(&self) -> bool {
        if !self.primed.swap(false, Ordering::SeqCst) {
            return false;
        }
        match self.tracker.upgrade() {
            Some(tracker) => {
                tracker.count_in_idle(self.duration_ms);
                true
            }
            None => {
                tracing::debug!(duration_ms = self.duration_ms, "tracker gone, idle gap dropped");
                false
            }
        }
    }

    /// Whether the gap has already been counted in (or the attempt was made).
    pub fn is_spent(&self) -> bool {
        !self.primed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CountInAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountInAck")
            .field("duration_ms", &self.duration_ms)
            .field("spent", &self.is_spent())
            .finish_non_exhaustive()
    }
}

/// Receives idle-gap events, typically to ask the user whether to count them.
pub trait IdleNotifier: Send + Sync {
    fn idle_gap(&self, gap: IdleGap);
}

/// Receives requests to redraw the tracker's status.
///
/// Requests are fire-and-forget and may arrive in bursts; implementations
/// should coalesce them.
pub trait StatusDisplay: Send + Sync {
    fn refresh(&self, relayout: bool);
}

impl IdleNotifier for () {
    fn idle_gap(&self, _gap: IdleGap) {}
}

impl StatusDisplay for () {
    fn refresh(&self, _relayout: bool) {}
}
