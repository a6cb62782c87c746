//! SQLite persistence layer.
//!
//! Raw SQL with rusqlite, no ORM. Each repository is a unit struct with
//! associated functions over a borrowed `Connection`; connections are
//! short-lived and scoped to one stage's writes, never to a whole pipeline
//! run.

pub mod meetings;
pub mod segments;
pub mod summaries;
pub mod tags;

pub use meetings::{MeetingRecord, MeetingRepository, MeetingStatus};
pub use segments::{SegmentRecord, SegmentRepository};
pub use summaries::{SummaryRecord, SummaryRepository};
pub use tags::TagRepository;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::PathBuf;

/// Handle owning the database location. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location under the application data directory.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(crate::global::db_file()?))
    }

    /// Open a connection, creating the database and schema when missing.
    pub fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&self.path).context("Failed to open database connection")?;
        migrate(&conn)?;

        Ok(conn)
    }
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meetings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            filename TEXT NOT NULL,
            duration_sec REAL,
            status TEXT NOT NULL DEFAULT 'uploaded',
            error_message TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create meetings table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meetings_status ON meetings(status)",
        [],
    )
    .context("Failed to create meetings status index")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS segments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_id INTEGER NOT NULL REFERENCES meetings(id),
            start REAL NOT NULL,
            \"end\" REAL NOT NULL,
            text TEXT NOT NULL,
            speaker TEXT,
            sentiment REAL
        )",
        [],
    )
    .context("Failed to create segments table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_segments_meeting ON segments(meeting_id)",
        [],
    )
    .context("Failed to create segments meeting index")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS summaries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_id INTEGER NOT NULL UNIQUE REFERENCES meetings(id),
            overview TEXT NOT NULL,
            key_topics TEXT NOT NULL,
            decisions TEXT NOT NULL,
            action_items TEXT NOT NULL,
            risks TEXT,
            vibe TEXT
        )",
        [],
    )
    .context("Failed to create summaries table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_id INTEGER NOT NULL REFERENCES meetings(id),
            name TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create tags table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tags_meeting ON tags(meeting_id)",
        [],
    )
    .context("Failed to create tags meeting index")?;

    Ok(())
}

#[cfg(test)]
pub(crate) fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    migrate(&conn).unwrap();
    conn
}
