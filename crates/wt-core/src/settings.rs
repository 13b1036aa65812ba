//! Persisted tracker state and the default-settings template.
//!
//! Both records are plain scalars. Every field has a compiled-in default, so
//! a payload missing a field (older or hand-edited) still loads.

use serde::{Deserialize, Serialize};

/// Default inactivity before a running tracker goes idle (2 minutes).
pub const DEFAULT_IDLE_THRESHOLD_MS: i64 = 2 * 60 * 1000;

/// Default window of idle seconds counted in without asking.
pub const DEFAULT_AUTO_COUNT_IDLE_SECONDS: i64 = 30;

/// Snapshot of one tracker as handed to and from the persistence store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerState {
    /// Counted time, rounded to whole seconds.
    pub total_time_seconds: i64,
    pub idle_threshold_ms: i64,
    pub auto_count_idle_seconds: i64,
    pub pause_other_tracker_instances: bool,
    pub auto_start: bool,
    /// Opaque counter owned by the host.
    pub nagged_about: i64,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            total_time_seconds: 0,
            idle_threshold_ms: DEFAULT_IDLE_THRESHOLD_MS,
            auto_count_idle_seconds: DEFAULT_AUTO_COUNT_IDLE_SECONDS,
            pause_other_tracker_instances: true,
            auto_start: false,
            nagged_about: 0,
        }
    }
}

/// The settings part of [`TrackerState`], kept once for all projects.
///
/// "Save as defaults" captures a tracker's settings here and "reset to
/// defaults" applies them back; counted time is never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultSettings {
    pub idle_threshold_ms: i64,
    pub auto_count_idle_seconds: i64,
    pub pause_other_tracker_instances: bool,
    pub auto_start: bool,
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self::from_state(&TrackerState::default())
    }
}

impl DefaultSettings {
    pub const fn from_state(state: &TrackerState) -> Self {
        Self {
            idle_threshold_ms: state.idle_threshold_ms,
            auto_count_idle_seconds: state.auto_count_idle_seconds,
            pause_other_tracker_instances: state.pause_other_tracker_instances,
            auto_start: state.auto_start,
        }
    }

    /// Overwrites the settings in `state`, leaving time and counters alone.
    pub fn apply_to(&self, state: &mut TrackerState) {
        state.idle_threshold_ms = self.idle_threshold_ms;
        state.auto_count_idle_seconds = self.auto_count_idle_seconds;
        state.pause_other_tracker_instances = self.pause_other_tracker_instances;
        state.auto_start = self.auto_start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let state: TrackerState =
            serde_json::from_str(r#"{"total_time_seconds": 90, "auto_start": true}"#).unwrap();

        assert_eq!(state.total_time_seconds, 90);
        assert!(state.auto_start);
        assert_eq!(state.idle_threshold_ms, DEFAULT_IDLE_THRESHOLD_MS);
        assert_eq!(state.auto_count_idle_seconds, DEFAULT_AUTO_COUNT_IDLE_SECONDS);
        assert!(state.pause_other_tracker_instances);
        assert_eq!(state.nagged_about, 0);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let state: TrackerState =
            serde_json::from_str(r#"{"total_time_seconds": 5, "git_time": 12}"#).unwrap();
        assert_eq!(state.total_time_seconds, 5);
    }

    #[test]
    fn defaults_apply_settings_only() {
        let mut state = TrackerState {
            total_time_seconds: 3_600,
            nagged_about: 7,
            ..TrackerState::default()
        };
        let defaults = DefaultSettings {
            idle_threshold_ms: 10_000,
            auto_count_idle_seconds: 0,
            pause_other_tracker_instances: false,
            auto_start: true,
        };

        defaults.apply_to(&mut state);

        assert_eq!(state.total_time_seconds, 3_600);
        assert_eq!(state.nagged_about, 7);
        assert_eq!(DefaultSettings::from_state(&state), defaults);
    }
}
