use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wt_cli::commands::settings::SettingsChange;
use wt_cli::commands::{adjust, defaults, forget, settings, status, watch};
use wt_cli::{Cli, Commands, Config, DefaultsAction};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(wt_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = wt_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so they never mix with command output.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let (db, config) = open_database(cli.config.as_deref())?;
    let mut stdout = io::stdout().lock();

    match command {
        Commands::Status { json } => {
            status::run(&mut stdout, &db, &config.database_path, *json)?;
        }
        Commands::Watch { projects } => {
            drop(stdout);
            watch::run(&db, projects, &config)?;
        }
        Commands::Adjust {
            project,
            delta,
            reset,
        } => {
            adjust::run(&mut stdout, &db, project, delta.as_deref(), *reset)?;
        }
        Commands::Settings {
            project,
            idle_threshold,
            auto_count,
            pause_others,
            auto_start,
        } => {
            let change = SettingsChange {
                idle_threshold_seconds: *idle_threshold,
                auto_count_idle_seconds: *auto_count,
                pause_other_tracker_instances: *pause_others,
                auto_start: *auto_start,
            };
            settings::run(&mut stdout, &db, project, change)?;
        }
        Commands::Forget { project } => {
            forget::run(&mut stdout, &db, project)?;
        }
        Commands::Defaults(action) => match action {
            DefaultsAction::Show => defaults::show(&mut stdout, &db)?,
            DefaultsAction::Save { project } => defaults::save(&mut stdout, &db, project)?,
            DefaultsAction::Apply { project } => defaults::apply(&mut stdout, &db, project)?,
        },
    }

    Ok(())
}
