//! CLI subcommand implementations.

pub mod adjust;
pub mod defaults;
pub mod forget;
pub mod settings;
pub mod status;
pub mod util;
pub mod watch;
