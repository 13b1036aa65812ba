//! Tracker status enum.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three states a tracker can be in. Exactly one holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Time is being counted.
    Running,
    /// Counting is paused because the user went idle; activity resumes it.
    Idle,
    /// Counting is off until explicitly started.
    #[default]
    Stopped,
}

impl Status {
    /// String representation used in output and persisted payloads.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Idle => "idle",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error for status strings that do not name a status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "idle" => Ok(Self::Idle),
            "stopped" => Ok(Self::Stopped),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}
