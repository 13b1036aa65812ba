//! The tracker state machine.
//!
//! # Algorithm Summary
//!
//! A tracker is RUNNING, IDLE or STOPPED. Time only accrues while RUNNING;
//! leaving RUNNING folds the interval into the total. While RUNNING a ticker
//! calls [`Tracker::tick`] once per [`TICK_PERIOD`], and each tick checks two
//! things:
//!
//! 1. Jump detection: if the previous tick is more than
//!    [`JUMP_DETECTION_THRESHOLD_MS`] ago the scheduler stalled (sleep,
//!    suspend). The tracker goes idle at the last moment it could still have
//!    been ticking, so the unmeasured gap is not counted.
//! 2. Idle detection: if the last activity is at least the idle threshold
//!    ago, the tracker goes idle at `last_activity + threshold`.
//!
//! Leaving IDLE either counts the gap silently (short gaps), or emits an
//! [`IdleGap`] whose single-shot action lets the user count it in.
//!
//! # Locking
//!
//! Every operation runs under the tracker's own mutex. Work that reaches
//! other objects (pausing sibling trackers, the notifier, the display) is
//! collected while locked and performed after the lock is released, so no
//! two tracker locks are ever held at once.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crate::activity::{ActivityReporter, ListenerId};
use crate::clock::{Clock, SystemClock};
use crate::format::ms_to_s;
use crate::notify::{IdleGap, IdleNotifier, StatusDisplay};
use crate::registry::{Registry, TrackerId};
use crate::settings::{DefaultSettings, TrackerState};
use crate::status::Status;
use crate::ticker::{ThreadTicker, TickHandle, TickTask, Ticker};

/// How often a running tracker ticks.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

const TICK_PERIOD_MS: i64 = 1000;

/// Gap between ticks beyond which the scheduler is assumed to have stalled.
pub const JUMP_DETECTION_THRESHOLD_MS: i64 = TICK_PERIOD_MS * 20;

/// Idle gaps this short are neither counted nor reported.
const MIN_REPORTED_IDLE_GAP_MS: i64 = 1000;

/// A change to the counted total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Add (or subtract, if negative) milliseconds. The total never drops below zero.
    By(i64),
    /// Zero the total and restart the current interval now.
    Reset,
}

/// Mutable tracker fields, guarded by [`Tracker::inner`].
#[derive(Debug)]
struct Inner {
    status: Status,
    total_time_ms: i64,
    status_started_ms: i64,
    last_tick_ms: i64,
    last_activity_ms: i64,

    idle_threshold_ms: i64,
    stop_when_idle_rather_than_pausing: bool,
    auto_count_idle_seconds: i64,
    pause_other_tracker_instances: bool,
    auto_start: bool,
    nagged_about: i64,

    ticker: Option<TickHandle>,
    /// Bumped on every ticker start; stale scheduled ticks compare against it.
    tick_generation: u64,
    auto_start_listener: Option<ListenerId>,
    closed: bool,
}

impl Inner {
    fn new(now_ms: i64) -> Self {
        let defaults = TrackerState::default();
        Self {
            status: Status::Stopped,
            total_time_ms: 0,
            status_started_ms: now_ms,
            last_tick_ms: now_ms,
            last_activity_ms: now_ms,
            idle_threshold_ms: defaults.idle_threshold_ms,
            stop_when_idle_rather_than_pausing: false,
            auto_count_idle_seconds: defaults.auto_count_idle_seconds,
            pause_other_tracker_instances: defaults.pause_other_tracker_instances,
            auto_start: defaults.auto_start,
            nagged_about: defaults.nagged_about,
            ticker: None,
            tick_generation: 0,
            auto_start_listener: None,
            closed: false,
        }
    }

    fn add_total_ms(&mut self, ms: i64) {
        self.total_time_ms = self.total_time_ms.saturating_add(ms).max(0);
    }

    const fn idle_target(&self) -> Status {
        if self.stop_when_idle_rather_than_pausing {
            Status::Stopped
        } else {
            Status::Idle
        }
    }

    fn cancel_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.cancel();
        }
    }
}

/// Work to do once the tracker lock is released.
#[derive(Debug, Default)]
#[must_use]
struct Effects {
    pause_others: bool,
    idle_gap: Option<IdleGap>,
    /// `Some(relayout)` when the display should be refreshed.
    refresh: Option<bool>,
}

impl Effects {
    fn refresh(relayout: bool) -> Self {
        Self {
            pause_others: false,
            idle_gap: None,
            refresh: Some(relayout),
        }
    }
}

/// Tracks working time for one project.
///
/// Always handled through an `Arc`; see [`Tracker::builder`].
pub struct Tracker {
    id: TrackerId,
    name: String,
    me: Weak<Tracker>,
    inner: Mutex<Inner>,
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
    ticker: Arc<dyn Ticker>,
    notifier: Arc<dyn IdleNotifier>,
    display: Arc<dyn StatusDisplay>,
    activity: Option<Arc<dyn ActivityReporter>>,
}

/// Configures and opens a [`Tracker`].
pub struct TrackerBuilder {
    name: String,
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
    ticker: Arc<dyn Ticker>,
    notifier: Arc<dyn IdleNotifier>,
    display: Arc<dyn StatusDisplay>,
    activity: Option<Arc<dyn ActivityReporter>>,
    state: Option<TrackerState>,
    stop_when_idle_rather_than_pausing: bool,
}

impl TrackerBuilder {
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    #[must_use]
    pub fn ticker(mut self, ticker: impl Ticker + 'static) -> Self {
        self.ticker = Arc::new(ticker);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn IdleNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn display(mut self, display: Arc<dyn StatusDisplay>) -> Self {
        self.display = display;
        self
    }

    /// Source of editor-change events used for auto start.
    #[must_use]
    pub fn activity(mut self, activity: Arc<dyn ActivityReporter>) -> Self {
        self.activity = Some(activity);
        self
    }

    /// Initial persisted state. Without one the compiled-in defaults apply.
    #[must_use]
    pub fn state(mut self, state: TrackerState) -> Self {
        self.state = Some(state);
        self
    }

    #[must_use]
    pub fn stop_when_idle_rather_than_pausing(mut self, stop: bool) -> Self {
        self.stop_when_idle_rather_than_pausing = stop;
        self
    }

    /// Creates the tracker (STOPPED) and registers it.
    pub fn open(self) -> Arc<Tracker> {
        let id = self.registry.allocate_id();
        let now = self.clock.now_ms();
        let mut inner = Inner::new(now);
        inner.stop_when_idle_rather_than_pausing = self.stop_when_idle_rather_than_pausing;

        let tracker = Arc::new_cyclic(|me| Tracker {
            id,
            name: self.name,
            me: me.clone(),
            inner: Mutex::new(inner),
            registry: self.registry,
            clock: self.clock,
            ticker: self.ticker,
            notifier: self.notifier,
            display: self.display,
            activity: self.activity,
        });

        tracker.registry.insert(id, Arc::downgrade(&tracker));
        tracing::debug!(tracker = %tracker.name, %id, "tracker opened");

        if let Some(state) = self.state {
            tracker.load_state(&state);
        }
        tracker
    }
}

impl Tracker {
    /// Starts building a tracker named `name` that lives in `registry`.
    pub fn builder(name: impl Into<String>, registry: Arc<Registry>) -> TrackerBuilder {
        TrackerBuilder {
            name: name.into(),
            registry,
            clock: Arc::new(SystemClock),
            ticker: Arc::new(ThreadTicker),
            notifier: Arc::new(()),
            display: Arc::new(()),
            activity: None,
            state: None,
            stop_when_idle_rather_than_pausing: false,
        }
    }

    pub const fn id(&self) -> TrackerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Performs work collected under the lock. Must be called unlocked.
    fn apply(&self, effects: Effects) {
        if effects.pause_others {
            for other in self.registry.snapshot() {
                if other.id != self.id {
                    other.other_tracker_started();
                }
            }
        }
        if let Some(gap) = effects.idle_gap {
            tracing::info!(tracker = %self.name, duration_ms = gap.duration_ms(), "idle gap detected");
            self.notifier.idle_gap(gap);
        }
        if let Some(relayout) = effects.refresh {
            self.display.refresh(relayout);
        }
    }

    /// The transition function. Caller holds the lock and applies the result.
    fn transition(&self, inner: &mut Inner, status: Status, at: i64) -> Effects {
        if inner.status == status {
            return Effects::default();
        }
        if inner.closed && status != Status::Stopped {
            tracing::debug!(tracker = %self.name, %status, "ignoring transition on closed tracker");
            return Effects::default();
        }

        inner.cancel_ticker();

        let previous = inner.status;
        let elapsed = (at - inner.status_started_ms).max(0);
        let mut effects = Effects::refresh(false);

        match previous {
            Status::Running => inner.add_total_ms(elapsed),
            Status::Idle => {
                if ms_to_s(elapsed) <= inner.auto_count_idle_seconds {
                    inner.add_total_ms(elapsed);
                } else if elapsed > MIN_REPORTED_IDLE_GAP_MS {
                    effects.idle_gap = Some(IdleGap::new(self.me.clone(), elapsed));
                }
            }
            Status::Stopped => {}
        }

        inner.status_started_ms = at;
        inner.last_tick_ms = at;
        inner.last_activity_ms = at;
        inner.status = status;

        if status == Status::Running {
            effects.pause_others = inner.pause_other_tracker_instances;
            self.start_ticker(inner);
        }

        tracing::debug!(
            tracker = %self.name,
            from = %previous,
            to = %status,
            at,
            elapsed_ms = elapsed,
            total_ms = inner.total_time_ms,
            "status changed"
        );
        effects
    }

    fn start_ticker(&self, inner: &mut Inner) {
        inner.tick_generation += 1;
        let generation = inner.tick_generation;
        let me = self.me.clone();
        let task: TickTask = Arc::new(move || {
            if let Some(tracker) = me.upgrade() {
                tracker.scheduled_tick(generation);
            }
        });
        inner.ticker = Some(self.ticker.schedule(TICK_PERIOD, task));
    }

    pub fn status(&self) -> Status {
        self.lock().status
    }

    /// Changes status now.
    pub fn set_status(&self, status: Status) {
        self.set_status_at(status, self.clock.now_ms());
    }

    /// Changes status as of `at` (epoch milliseconds).
    pub fn set_status_at(&self, status: Status, at: i64) {
        let effects = {
            let mut inner = self.lock();
            self.transition(&mut inner, status, at)
        };
        self.apply(effects);
    }

    /// RUNNING stops; STOPPED and IDLE start running.
    pub fn toggle_running(&self) {
        let now = self.clock.now_ms();
        let effects = {
            let mut inner = self.lock();
            let target = match inner.status {
                Status::Running => Status::Stopped,
                Status::Stopped | Status::Idle => Status::Running,
            };
            self.transition(&mut inner, target, now)
        };
        self.apply(effects);
    }

    /// Runs one tick of idle and jump detection.
    ///
    /// Only meaningful while RUNNING; otherwise logs a warning and does nothing.
    pub fn tick(&self) {
        self.tick_inner(None);
    }

    fn scheduled_tick(&self, generation: u64) {
        self.tick_inner(Some(generation));
    }

    fn tick_inner(&self, generation: Option<u64>) {
        let effects = {
            let mut inner = self.lock();

            if let Some(generation) = generation {
                if inner.ticker.is_none() || generation != inner.tick_generation {
                    tracing::trace!(tracker = %self.name, generation, "dropping stale tick");
                    return;
                }
            }

            if inner.status != Status::Running {
                tracing::warn!(tracker = %self.name, status = %inner.status, "tick while not running");
                return;
            }

            let now = self.clock.now_ms();
            let since_last_tick = now - inner.last_tick_ms;
            let since_last_activity = now - inner.last_activity_ms;

            if since_last_tick > JUMP_DETECTION_THRESHOLD_MS {
                let last_valid = inner.last_tick_ms + JUMP_DETECTION_THRESHOLD_MS;
                tracing::info!(
                    tracker = %self.name,
                    since_last_tick,
                    "tick jump detected, assuming the scheduler stalled"
                );
                let target = inner.idle_target();
                self.transition(&mut inner, target, last_valid)
            } else if since_last_activity >= inner.idle_threshold_ms {
                let last_valid = inner.last_activity_ms + inner.idle_threshold_ms;
                let target = inner.idle_target();
                self.transition(&mut inner, target, last_valid)
            } else {
                inner.last_tick_ms = now;
                Effects::refresh(false)
            }
        };
        self.apply(effects);
    }

    /// Records user activity now.
    pub fn notify_activity(&self) {
        self.notify_activity_at(self.clock.now_ms());
    }

    /// Records user activity at `at`. An IDLE tracker resumes running.
    pub fn notify_activity_at(&self, at: i64) {
        let effects = {
            let mut inner = self.lock();
            inner.last_activity_ms = inner.last_activity_ms.max(at);
            if inner.status == Status::Idle {
                self.transition(&mut inner, Status::Running, at)
            } else {
                Effects::default()
            }
        };
        self.apply(effects);
    }

    /// Auto-start hook for "active editor content changed".
    pub fn editor_content_changed(&self) {
        let now = self.clock.now_ms();
        let effects = {
            let mut inner = self.lock();
            if inner.auto_start && inner.status != Status::Running {
                self.transition(&mut inner, Status::Running, now)
            } else {
                Effects::default()
            }
        };
        self.apply(effects);
    }

    /// A sibling started running with cross-instance pausing enabled.
    fn other_tracker_started(&self) {
        let now = self.clock.now_ms();
        let effects = {
            let mut inner = self.lock();
            if inner.status == Status::Stopped {
                Effects::default()
            } else {
                self.transition(&mut inner, Status::Idle, now)
            }
        };
        self.apply(effects);
    }

    /// Called by [`CountInAck`](crate::CountInAck) when the user accepts an idle gap.
    pub(crate) fn count_in_idle(&self, duration_ms: i64) {
        self.lock().add_total_ms(duration_ms);
        self.apply(Effects::refresh(false));
    }

    /// Counted time in whole seconds, including the running interval.
    pub fn elapsed_seconds(&self) -> i64 {
        let now = self.clock.now_ms();
        let inner = self.lock();
        let mut total = inner.total_time_ms;
        if inner.status == Status::Running {
            total = total.saturating_add((now - inner.status_started_ms).max(0));
        }
        ms_to_s(total)
    }

    /// Folded total in milliseconds, excluding the running interval.
    pub fn total_time_ms(&self) -> i64 {
        self.lock().total_time_ms
    }

    pub fn adjust_total(&self, adjustment: Adjustment) {
        let now = self.clock.now_ms();
        {
            let mut inner = self.lock();
            match adjustment {
                Adjustment::By(ms) => inner.add_total_ms(ms),
                Adjustment::Reset => {
                    inner.total_time_ms = 0;
                    inner.status_started_ms = now;
                }
            }
        }
        self.apply(Effects::refresh(false));
    }

    /// Folds the running interval into the total, e.g. before persisting.
    pub fn save_time(&self) {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        if inner.status == Status::Running {
            let elapsed = (now - inner.status_started_ms).max(0);
            inner.status_started_ms = now;
            inner.add_total_ms(elapsed);
        }
    }

    /// Snapshot for the persistence store. The running interval is not
    /// included; call [`save_time`](Self::save_time) first.
    pub fn state(&self) -> TrackerState {
        let inner = self.lock();
        TrackerState {
            total_time_seconds: ms_to_s(inner.total_time_ms),
            idle_threshold_ms: inner.idle_threshold_ms,
            auto_count_idle_seconds: inner.auto_count_idle_seconds,
            pause_other_tracker_instances: inner.pause_other_tracker_instances,
            auto_start: inner.auto_start,
            nagged_about: inner.nagged_about,
        }
    }

    pub fn load_state(&self, state: &TrackerState) {
        {
            let mut inner = self.lock();
            inner.total_time_ms = state.total_time_seconds.saturating_mul(1000).max(0);
            inner.idle_threshold_ms = state.idle_threshold_ms;
            inner.auto_count_idle_seconds = state.auto_count_idle_seconds;
            inner.pause_other_tracker_instances = state.pause_other_tracker_instances;
            inner.nagged_about = state.nagged_about;
            self.set_auto_start_locked(&mut inner, state.auto_start);
        }
        self.apply(Effects::refresh(true));
    }

    /// Applies the default-settings template ("reset to defaults").
    pub fn apply_defaults(&self, defaults: &DefaultSettings) {
        {
            let mut inner = self.lock();
            inner.idle_threshold_ms = defaults.idle_threshold_ms;
            inner.auto_count_idle_seconds = defaults.auto_count_idle_seconds;
            inner.pause_other_tracker_instances = defaults.pause_other_tracker_instances;
            self.set_auto_start_locked(&mut inner, defaults.auto_start);
        }
        self.apply(Effects::refresh(true));
    }

    /// Unregisters the tracker and stops it, folding any running time.
    ///
    /// Further attempts to start it are ignored.
    pub fn close(&self) {
        self.registry.remove(self.id);
        let now = self.clock.now_ms();
        let effects = {
            let mut inner = self.lock();
            self.set_auto_start_listener(&mut inner, false);
            let effects = self.transition(&mut inner, Status::Stopped, now);
            inner.closed = true;
            effects
        };
        self.apply(effects);
        tracing::debug!(tracker = %self.name, id = %self.id, "tracker closed");
    }

    pub fn idle_threshold_ms(&self) -> i64 {
        self.lock().idle_threshold_ms
    }

    pub fn set_idle_threshold_ms(&self, idle_threshold_ms: i64) {
        self.lock().idle_threshold_ms = idle_threshold_ms;
    }

    pub fn auto_count_idle_seconds(&self) -> i64 {
        self.lock().auto_count_idle_seconds
    }

    pub fn set_auto_count_idle_seconds(&self, seconds: i64) {
        self.lock().auto_count_idle_seconds = seconds;
    }

    pub fn pause_other_tracker_instances(&self) -> bool {
        self.lock().pause_other_tracker_instances
    }

    pub fn set_pause_other_tracker_instances(&self, pause: bool) {
        self.lock().pause_other_tracker_instances = pause;
    }

    pub fn stop_when_idle_rather_than_pausing(&self) -> bool {
        self.lock().stop_when_idle_rather_than_pausing
    }

    pub fn set_stop_when_idle_rather_than_pausing(&self, stop: bool) {
        self.lock().stop_when_idle_rather_than_pausing = stop;
    }

    pub fn auto_start(&self) -> bool {
        self.lock().auto_start
    }

    /// Enables or disables starting on editor changes.
    pub fn set_auto_start(&self, auto_start: bool) {
        let mut inner = self.lock();
        self.set_auto_start_locked(&mut inner, auto_start);
    }

    pub fn nagged_about(&self) -> i64 {
        self.lock().nagged_about
    }

    pub fn set_nagged_about(&self, nagged_about: i64) {
        self.lock().nagged_about = nagged_about;
    }

    fn set_auto_start_locked(&self, inner: &mut Inner, auto_start: bool) {
        inner.auto_start = auto_start;
        self.set_auto_start_listener(inner, auto_start && !inner.closed);
    }

    fn set_auto_start_listener(&self, inner: &mut Inner, enabled: bool) {
        let Some(activity) = &self.activity else {
            return;
        };
        if let Some(id) = inner.auto_start_listener.take() {
            activity.remove_edit_listener(id);
        }
        if enabled {
            let me = self.me.clone();
            let id = activity.add_edit_listener(Arc::new(move || {
                if let Some(tracker) = me.upgrade() {
                    tracker.editor_content_changed();
                }
            }));
            inner.auto_start_listener = Some(id);
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.registry.remove(self.id);
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.cancel_ticker();
        if let (Some(activity), Some(id)) = (&self.activity, inner.auto_start_listener.take()) {
            activity.remove_edit_listener(id);
        }
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}
