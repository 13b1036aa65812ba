//! Storage layer for the time tracker.
//!
//! Persists one [`TrackerState`] per project plus a single
//! [`DefaultSettings`] template using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Hosts that save from several threads wrap it in a `Mutex<Database>`.
//!
//! # Schema
//!
//! Both tables store their record as a JSON payload in a `data` column. The
//! records deserialize with per-field defaults, so:
//! - Adding fields: old rows load with the compiled-in default
//! - Removing fields: old rows still load, the extra key is ignored
//! - Renaming fields: the old value is lost (requires migration)
//!
//! Timestamps (`updated_at`) are TEXT in ISO 8601 format with millisecond
//! precision, always UTC.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use wt_core::{DefaultSettings, TrackerState};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored payload could not be parsed.
    #[error("invalid stored state for {key}")]
    InvalidPayload {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// A record could not be serialized.
    #[error("failed to serialize {key}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A project's persisted tracker state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredState {
    pub project: String,
    pub state: TrackerState,
    pub updated_at: String,
}

const DEFAULTS_KEY: &str = "defaults";

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- One row per tracked project.
            -- data: JSON TrackerState payload
            CREATE TABLE IF NOT EXISTS tracker_states (
                project TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- The single default-settings template.
            CREATE TABLE IF NOT EXISTS default_settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Loads a project's state, or `None` if it was never saved.
    pub fn load_state(&self, project: &str) -> Result<Option<TrackerState>, DbError> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM tracker_states WHERE project = ?",
                params![project],
                |row| row.get(0),
            )
            .optional()?;

        data.map(|data| parse_payload(project, &data)).transpose()
    }

    /// Inserts or replaces a project's state.
    pub fn save_state(&self, project: &str, state: &TrackerState) -> Result<(), DbError> {
        let data = serde_json::to_string(state).map_err(|source| DbError::Serialize {
            key: project.to_string(),
            source,
        })?;
        self.conn.execute(
            "
            INSERT INTO tracker_states (project, data, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(project) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            ",
            params![project, data, now_timestamp()],
        )?;
        tracing::debug!(
            project,
            total_time_seconds = state.total_time_seconds,
            "saved tracker state"
        );
        Ok(())
    }

    /// Lists every stored project state, ordered by project name.
    pub fn list_states(&self) -> Result<Vec<StoredState>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT project, data, updated_at
            FROM tracker_states
            ORDER BY project ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut states = Vec::new();
        for row in rows {
            let (project, data, updated_at) = row?;
            let state = parse_payload(&project, &data)?;
            states.push(StoredState {
                project,
                state,
                updated_at,
            });
        }
        Ok(states)
    }

    /// Deletes a project's state. Returns `false` if there was none.
    pub fn delete_state(&self, project: &str) -> Result<bool, DbError> {
        let deleted = self.conn.execute(
            "DELETE FROM tracker_states WHERE project = ?",
            params![project],
        )?;
        Ok(deleted > 0)
    }

    /// Loads the default-settings template, falling back to compiled-in defaults.
    pub fn load_defaults(&self) -> Result<DefaultSettings, DbError> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM default_settings WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match data {
            Some(data) => parse_payload(DEFAULTS_KEY, &data),
            None => Ok(DefaultSettings::default()),
        }
    }

    /// Replaces the default-settings template.
    pub fn save_defaults(&self, defaults: &DefaultSettings) -> Result<(), DbError> {
        let data = serde_json::to_string(defaults).map_err(|source| DbError::Serialize {
            key: DEFAULTS_KEY.to_string(),
            source,
        })?;
        self.conn.execute(
            "
            INSERT INTO default_settings (id, data, updated_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            ",
            params![data, now_timestamp()],
        )?;
        tracing::debug!(?defaults, "saved default settings");
        Ok(())
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(key: &str, data: &str) -> Result<T, DbError> {
    serde_json::from_str(data).map_err(|source| DbError::InvalidPayload {
        key: key.to_string(),
        source,
    })
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
