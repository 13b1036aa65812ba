//! Shared utilities for CLI commands.

use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use regex::Regex;

use wt_core::{Registry, Tracker, TrackerState};
use wt_db::Database;

/// Pre-compiled regex for signed time deltas.
static DELTA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-]?)(\d+)\s*(s|sec|m|min|h)$").unwrap());

/// Conservative bound for deltas (~100 years in seconds).
const MAX_DELTA_SECONDS: i64 = 100 * 365 * 24 * 60 * 60;

/// Parse a signed delta such as `+30s`, `-5m` or `1h` into milliseconds.
pub fn parse_delta(s: &str) -> Result<i64> {
    let Some(caps) = DELTA_RE.captures(s.trim()) else {
        anyhow::bail!("Invalid time delta: {s}. Use a signed amount with a unit, e.g. +30s, -5m, +1h");
    };

    let amount: i64 = caps[2]
        .parse()
        .context("failed to parse number in time delta")?;

    let seconds_per_unit = match &caps[3] {
        "s" | "sec" => 1,
        "m" | "min" => 60,
        "h" => 60 * 60,
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if amount > MAX_DELTA_SECONDS / seconds_per_unit {
        anyhow::bail!("Time delta too large: {s}");
    }

    let ms = amount * seconds_per_unit * 1000;
    Ok(if &caps[1] == "-" { -ms } else { ms })
}

/// Stored state for `project`, or the saved default settings for a new one.
pub fn stored_state(db: &Database, project: &str) -> Result<TrackerState> {
    if let Some(state) = db
        .load_state(project)
        .with_context(|| format!("failed to load state for {project}"))?
    {
        return Ok(state);
    }
    let mut state = TrackerState::default();
    db.load_defaults()
        .context("failed to load default settings")?
        .apply_to(&mut state);
    Ok(state)
}

/// Opens a stopped tracker for `project` from its stored state.
///
/// Used by one-shot commands that edit state without tracking time.
pub fn open_stored(db: &Database, project: &str) -> Result<Arc<Tracker>> {
    let state = stored_state(db, project)?;
    Ok(Tracker::builder(project, Arc::new(Registry::new()))
        .state(state)
        .open())
}

/// Persists a tracker's state under its name.
pub fn save(db: &Database, tracker: &Tracker) -> Result<()> {
    db.save_state(tracker.name(), &tracker.state())
        .with_context(|| format!("failed to save state for {}", tracker.name()))
}

/// Renders a boolean setting for humans.
pub const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_signed_deltas() {
        assert_eq!(parse_delta("+30s").unwrap(), 30_000);
        assert_eq!(parse_delta("-5m").unwrap(), -300_000);
        assert_eq!(parse_delta("1h").unwrap(), 3_600_000);
        assert_eq!(parse_delta(" 10 min ").unwrap(), 600_000);
    }

    #[test]
    fn rejects_malformed_deltas() {
        assert!(parse_delta("five minutes").is_err());
        assert!(parse_delta("+5d").is_err());
        assert!(parse_delta("").is_err());
    }

    #[test]
    fn rejects_huge_deltas() {
        let err = parse_delta("+99999999999999h").unwrap_err();
        assert!(err.to_string().contains("too large") || err.to_string().contains("parse"));
    }

    #[test]
    fn open_stored_defaults_for_unknown_project() {
        let db = Database::open_in_memory().unwrap();
        let tracker = open_stored(&db, "fresh").unwrap();
        assert_eq!(tracker.name(), "fresh");
        assert_eq!(tracker.state(), TrackerState::default());
    }

    #[test]
    fn new_projects_take_saved_defaults() {
        let db = Database::open_in_memory().unwrap();
        db.save_defaults(&wt_core::DefaultSettings {
            idle_threshold_ms: 10_000,
            auto_count_idle_seconds: 5,
            pause_other_tracker_instances: false,
            auto_start: true,
        })
        .unwrap();
        db.save_state(
            "known",
            &TrackerState {
                total_time_seconds: 9,
                ..TrackerState::default()
            },
        )
        .unwrap();

        let fresh = stored_state(&db, "fresh").unwrap();
        assert_eq!(fresh.idle_threshold_ms, 10_000);
        assert!(fresh.auto_start);
        assert_eq!(fresh.total_time_seconds, 0);

        let known = stored_state(&db, "known").unwrap();
        assert_eq!(known.total_time_seconds, 9);
        assert_eq!(known.idle_threshold_ms, 120_000);
    }
}
