//! Core logic for the per-project time tracker.
//!
//! This crate contains:
//! - Tracker: the RUNNING/IDLE/STOPPED state machine with idle and jump detection
//! - Registry: the set of live trackers used for cross-instance pausing
//! - Ticker and clock seams, with manual versions for tests
//! - Collaborator contracts for notifications, display and activity events
//! - Duration formatting and the persisted settings record

mod activity;
mod clock;
pub mod format;
mod notify;
mod registry;
mod settings;
mod status;
mod ticker;
mod tracker;

pub use activity::{ActivityHub, ActivityReporter, EditListener, ListenerId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use format::{millis_to_string, ms_to_s};
pub use notify::{CountInAck, IdleGap, IdleNotifier, StatusDisplay};
pub use registry::{Registry, TrackerId};
pub use settings::{
    DEFAULT_AUTO_COUNT_IDLE_SECONDS, DEFAULT_IDLE_THRESHOLD_MS, DefaultSettings, TrackerState,
};
pub use status::{Status, UnknownStatus};
pub use ticker::{ManualTicker, ThreadTicker, TickHandle, TickTask, Ticker};
pub use tracker::{
    Adjustment, JUMP_DETECTION_THRESHOLD_MS, TICK_PERIOD, Tracker, TrackerBuilder,
};
