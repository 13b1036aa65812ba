//! Forget command for dropping a project's stored state.

use std::io::Write;

use anyhow::{Context, Result};

use wt_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, project: &str) -> Result<()> {
    let deleted = db
        .delete_state(project)
        .with_context(|| format!("failed to delete state for {project}"))?;

    if deleted {
        tracing::debug!(project, "forgot project");
        writeln!(writer, "Forgot {project}.")?;
    } else {
        writeln!(writer, "No stored state for {project}.")?;
    }
    Ok(())
}
