//! Working-time tracker CLI library.
//!
//! This crate provides the CLI interface for the tracker.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, DefaultsAction};
pub use config::Config;
