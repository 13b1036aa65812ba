//! Adjust command for correcting counted time.

use std::io::Write;

use anyhow::{Context, Result};

use wt_core::{Adjustment, millis_to_string};
use wt_db::Database;

use super::util;

/// Runs the adjust command.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    project: &str,
    delta: Option<&str>,
    reset: bool,
) -> Result<()> {
    let adjustment = if reset {
        Adjustment::Reset
    } else {
        let delta = delta.context("a time delta or --reset is required")?;
        Adjustment::By(util::parse_delta(delta)?)
    };

    let tracker = util::open_stored(db, project)?;
    tracker.adjust_total(adjustment);
    util::save(db, &tracker)?;
    tracing::debug!(project, ?adjustment, "adjusted counted time");

    writeln!(
        writer,
        "{project}: {}",
        millis_to_string(tracker.elapsed_seconds() * 1000)
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use wt_core::TrackerState;

    fn run_to_string(db: &Database, delta: Option<&str>, reset: bool) -> Result<String> {
        let mut output = Vec::new();
        run(&mut output, db, "alpha", delta, reset)?;
        Ok(String::from_utf8(output).unwrap())
    }

    #[test]
    fn adds_time_to_stored_total() {
        let db = Database::open_in_memory().unwrap();
        db.save_state(
            "alpha",
            &TrackerState {
                total_time_seconds: 60,
                ..TrackerState::default()
            },
        )
        .unwrap();

        let output = run_to_string(&db, Some("+5m"), false).unwrap();

        assert_eq!(output, "alpha: 6m 0s\n");
        assert_eq!(db.load_state("alpha").unwrap().unwrap().total_time_seconds, 360);
    }

    #[test]
    fn subtracting_past_zero_clamps() {
        let db = Database::open_in_memory().unwrap();
        let output = run_to_string(&db, Some("-1h"), false).unwrap();

        assert_eq!(output, "alpha: 0sec\n");
        assert_eq!(db.load_state("alpha").unwrap().unwrap().total_time_seconds, 0);
    }

    #[test]
    fn reset_keeps_settings() {
        let db = Database::open_in_memory().unwrap();
        db.save_state(
            "alpha",
            &TrackerState {
                total_time_seconds: 500,
                auto_start: true,
                ..TrackerState::default()
            },
        )
        .unwrap();

        run_to_string(&db, None, true).unwrap();

        let state = db.load_state("alpha").unwrap().unwrap();
        assert_eq!(state.total_time_seconds, 0);
        assert!(state.auto_start);
    }

    #[test]
    fn bad_delta_leaves_state_untouched() {
        let db = Database::open_in_memory().unwrap();
        assert!(run_to_string(&db, Some("soon"), false).is_err());
        assert!(db.load_state("alpha").unwrap().is_none());
    }
}
