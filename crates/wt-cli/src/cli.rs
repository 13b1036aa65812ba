//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::settings::MAX_SETTING_SECONDS;

/// Per-project working-time tracker.
///
/// Counts time while you work, pauses when you go idle, and asks before
/// counting long breaks.
#[derive(Debug, Parser)]
#[command(name = "wt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show counted time for every stored project.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Track one or more projects, reading activity commands from stdin.
    ///
    /// Each line is a command: `activity`, `edit`, `save`, `start`, `stop`,
    /// `toggle`, `add <delta>`, `reset`, `count-in`, `status`, `quit`.
    /// Commands act on the first project unless a project name is appended.
    Watch {
        /// Projects to track.
        #[arg(required = true)]
        projects: Vec<String>,
    },

    /// Add or remove counted time, e.g. `+30s`, `-5m`, `+1h`.
    Adjust {
        /// The project to adjust.
        project: String,

        /// Signed amount with unit (s, m, h).
        #[arg(allow_hyphen_values = true, required_unless_present = "reset")]
        delta: Option<String>,

        /// Reset counted time to zero instead.
        #[arg(long, conflicts_with = "delta")]
        reset: bool,
    },

    /// Show or change a project's settings.
    Settings {
        /// The project to configure.
        project: String,

        /// Seconds of inactivity before the tracker goes idle.
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..=MAX_SETTING_SECONDS))]
        idle_threshold: Option<i64>,

        /// Idle gaps up to this many seconds are counted without asking.
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..=MAX_SETTING_SECONDS))]
        auto_count: Option<i64>,

        /// Pause other tracked projects when this one starts.
        #[arg(long)]
        pause_others: Option<bool>,

        /// Start on editor changes.
        #[arg(long)]
        auto_start: Option<bool>,
    },

    /// Delete a project's stored time and settings.
    Forget {
        /// The project to forget.
        project: String,
    },

    /// Manage the default settings template.
    #[command(subcommand)]
    Defaults(DefaultsAction),
}

/// Default-settings template actions.
#[derive(Debug, Subcommand)]
pub enum DefaultsAction {
    /// Show the template.
    Show,

    /// Save a project's settings as the template.
    Save {
        /// The project to copy settings from.
        project: String,
    },

    /// Reset a project's settings to the template.
    Apply {
        /// The project to reset.
        project: String,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn adjust_accepts_negative_delta() {
        let cli = Cli::try_parse_from(["wt", "adjust", "alpha", "-5m"]).unwrap();
        match cli.command {
            Some(Commands::Adjust { delta, reset, .. }) => {
                assert_eq!(delta.as_deref(), Some("-5m"));
                assert!(!reset);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn adjust_requires_delta_or_reset() {
        assert!(Cli::try_parse_from(["wt", "adjust", "alpha"]).is_err());
        assert!(Cli::try_parse_from(["wt", "adjust", "alpha", "--reset"]).is_ok());
    }

    #[test]
    fn settings_reject_out_of_range_seconds() {
        assert!(Cli::try_parse_from(["wt", "settings", "alpha", "--idle-threshold", "300"]).is_ok());
        assert!(
            Cli::try_parse_from([
                "wt",
                "settings",
                "alpha",
                "--idle-threshold",
                "9223372036854775807"
            ])
            .is_err()
        );
        assert!(Cli::try_parse_from(["wt", "settings", "alpha", "--auto-count", "-1"]).is_err());
    }

    #[test]
    fn watch_requires_a_project() {
        assert!(Cli::try_parse_from(["wt", "watch"]).is_err());
    }
}
