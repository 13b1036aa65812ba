//! Settings command for showing and changing a project's settings.

use std::io::Write;

use anyhow::Result;

use wt_core::{Tracker, ms_to_s};
use wt_db::Database;

use super::util::{self, yes_no};

/// Upper bound for the second-valued settings (one week).
pub const MAX_SETTING_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Requested changes; `None` leaves a setting as it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettingsChange {
    pub idle_threshold_seconds: Option<i64>,
    pub auto_count_idle_seconds: Option<i64>,
    pub pause_other_tracker_instances: Option<bool>,
    pub auto_start: Option<bool>,
}

impl SettingsChange {
    const fn is_empty(&self) -> bool {
        self.idle_threshold_seconds.is_none()
            && self.auto_count_idle_seconds.is_none()
            && self.pause_other_tracker_instances.is_none()
            && self.auto_start.is_none()
    }

    fn apply(&self, tracker: &Tracker) {
        if let Some(seconds) = self.idle_threshold_seconds {
            tracker.set_idle_threshold_ms(seconds.clamp(0, MAX_SETTING_SECONDS) * 1000);
        }
        if let Some(seconds) = self.auto_count_idle_seconds {
            tracker.set_auto_count_idle_seconds(seconds.clamp(0, MAX_SETTING_SECONDS));
        }
        if let Some(pause) = self.pause_other_tracker_instances {
            tracker.set_pause_other_tracker_instances(pause);
        }
        if let Some(auto_start) = self.auto_start {
            tracker.set_auto_start(auto_start);
        }
    }
}

/// Runs the settings command.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    project: &str,
    change: SettingsChange,
) -> Result<()> {
    let tracker = util::open_stored(db, project)?;

    if !change.is_empty() {
        change.apply(&tracker);
        util::save(db, &tracker)?;
        tracing::debug!(project, ?change, "updated settings");
    }

    print_settings(writer, &tracker)
}

pub fn print_settings<W: Write>(writer: &mut W, tracker: &Tracker) -> Result<()> {
    writeln!(writer, "Settings for {}", tracker.name())?;
    writeln!(
        writer,
        "  idle threshold:     {}s",
        ms_to_s(tracker.idle_threshold_ms())
    )?;
    writeln!(
        writer,
        "  auto-count idle:    {}s",
        tracker.auto_count_idle_seconds()
    )?;
    writeln!(
        writer,
        "  pause others:       {}",
        yes_no(tracker.pause_other_tracker_instances())
    )?;
    writeln!(writer, "  auto start:         {}", yes_no(tracker.auto_start()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    #[test]
    fn shows_defaults_without_saving() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        run(&mut output, &db, "alpha", SettingsChange::default()).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Settings for alpha
          idle threshold:     120s
          auto-count idle:    30s
          pause others:       yes
          auto start:         no
        ");
        assert!(db.load_state("alpha").unwrap().is_none());
    }

    #[test]
    fn changes_are_persisted() {
        let db = Database::open_in_memory().unwrap();
        let change = SettingsChange {
            idle_threshold_seconds: Some(300),
            auto_count_idle_seconds: Some(-4),
            pause_other_tracker_instances: None,
            auto_start: Some(true),
        };
        run(&mut Vec::new(), &db, "alpha", change).unwrap();

        let state = db.load_state("alpha").unwrap().unwrap();
        assert_eq!(state.idle_threshold_ms, 300_000);
        assert_eq!(state.auto_count_idle_seconds, 0);
        assert!(state.pause_other_tracker_instances);
        assert!(state.auto_start);
    }

    #[test]
    fn huge_values_are_clamped() {
        let db = Database::open_in_memory().unwrap();
        let change = SettingsChange {
            idle_threshold_seconds: Some(i64::MAX),
            auto_count_idle_seconds: Some(i64::MAX),
            ..SettingsChange::default()
        };
        let mut output = Vec::new();
        run(&mut output, &db, "alpha", change).unwrap();

        let state = db.load_state("alpha").unwrap().unwrap();
        assert_eq!(state.idle_threshold_ms, MAX_SETTING_SECONDS * 1000);
        assert_eq!(state.auto_count_idle_seconds, MAX_SETTING_SECONDS);
        assert!(String::from_utf8(output).unwrap().contains("idle threshold:     604800s"));
    }
}
