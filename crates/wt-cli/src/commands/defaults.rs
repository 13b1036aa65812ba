//! Defaults command for the shared settings template.

use std::io::Write;

use anyhow::{Context, Result};

use wt_core::{DefaultSettings, ms_to_s};
use wt_db::Database;

use super::settings::print_settings;
use super::util::{self, yes_no};

/// Prints the stored template.
pub fn show<W: Write>(writer: &mut W, db: &Database) -> Result<()> {
    let defaults = db.load_defaults().context("failed to load default settings")?;
    writeln!(writer, "Default settings")?;
    writeln!(
        writer,
        "  idle threshold:     {}s",
        ms_to_s(defaults.idle_threshold_ms)
    )?;
    writeln!(
        writer,
        "  auto-count idle:    {}s",
        defaults.auto_count_idle_seconds
    )?;
    writeln!(
        writer,
        "  pause others:       {}",
        yes_no(defaults.pause_other_tracker_instances)
    )?;
    writeln!(writer, "  auto start:         {}", yes_no(defaults.auto_start))?;
    Ok(())
}

/// Copies a project's settings into the template ("save as defaults").
pub fn save<W: Write>(writer: &mut W, db: &Database, project: &str) -> Result<()> {
    let tracker = util::open_stored(db, project)?;
    let defaults = DefaultSettings::from_state(&tracker.state());
    db.save_defaults(&defaults)
        .context("failed to save default settings")?;
    writeln!(writer, "Saved settings of {project} as defaults.")?;
    Ok(())
}

/// Resets a project's settings to the template ("reset to defaults").
pub fn apply<W: Write>(writer: &mut W, db: &Database, project: &str) -> Result<()> {
    let defaults = db.load_defaults().context("failed to load default settings")?;
    let tracker = util::open_stored(db, project)?;
    tracker.apply_defaults(&defaults);
    util::save(db, &tracker)?;
    print_settings(writer, &tracker)
}
