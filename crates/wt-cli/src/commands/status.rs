//! Status command for showing counted time per project.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use wt_core::{millis_to_string, ms_to_s};
use wt_db::{Database, StoredState};

use super::util::yes_no;

#[derive(Debug, Serialize)]
struct ProjectStatus<'a> {
    project: &'a str,
    total_time_seconds: i64,
    total: String,
    idle_threshold_seconds: i64,
    auto_count_idle_seconds: i64,
    pause_other_tracker_instances: bool,
    auto_start: bool,
    updated_at: &'a str,
}

impl<'a> ProjectStatus<'a> {
    fn new(stored: &'a StoredState) -> Self {
        let state = &stored.state;
        Self {
            project: &stored.project,
            total_time_seconds: state.total_time_seconds,
            total: millis_to_string(state.total_time_seconds.saturating_mul(1000)),
            idle_threshold_seconds: ms_to_s(state.idle_threshold_ms),
            auto_count_idle_seconds: state.auto_count_idle_seconds,
            pause_other_tracker_instances: state.pause_other_tracker_instances,
            auto_start: state.auto_start,
            updated_at: &stored.updated_at,
        }
    }
}

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path, json: bool) -> Result<()> {
    let stored = db.list_states().context("failed to list project states")?;
    let projects: Vec<ProjectStatus<'_>> = stored.iter().map(ProjectStatus::new).collect();

    if json {
        serde_json::to_writer_pretty(&mut *writer, &projects)?;
        writeln!(writer)?;
        return Ok(());
    }

    writeln!(writer, "Time tracker status")?;
    writeln!(writer, "Database: {}", database_path.display())?;

    if projects.is_empty() {
        writeln!(writer, "No projects tracked.")?;
        return Ok(());
    }

    writeln!(writer, "Projects:")?;
    for project in projects {
        writeln!(
            writer,
            "- {}: {} (idle after {}s, auto-count {}s, pause others: {}, auto start: {})",
            project.project,
            project.total,
            project.idle_threshold_seconds,
            project.auto_count_idle_seconds,
            yes_no(project.pause_other_tracker_instances),
            yes_no(project.auto_start),
        )?;
    }

    Ok(())
}
