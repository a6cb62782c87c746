//! Meeting record persistence and the pipeline status machine.
//!
//! The `status` column is the single source of truth for pipeline progress.
//! Transitions: uploaded|failed|completed -> processing -> {completed, failed}.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

/// Pipeline status of a meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(Self::Uploaded),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A meeting record from the database.
#[derive(Debug, Clone)]
pub struct MeetingRecord {
    pub id: i64,
    pub title: String,
    pub filename: String,
    pub duration_sec: Option<f64>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: String,
}

const COLUMNS: &str = "id, title, filename, duration_sec, status, error_message, created_at";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MeetingRecord> {
    Ok(MeetingRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        filename: row.get(2)?,
        duration_sec: row.get(3)?,
        status: row.get(4)?,
        error_message: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Repository for meeting records.
pub struct MeetingRepository;

impl MeetingRepository {
    /// Insert a new meeting (status = uploaded). Returns the new meeting ID.
    pub fn insert(conn: &Connection, title: &str, filename: &str) -> Result<i64> {
        conn.execute(
            "INSERT INTO meetings (title, filename, status) VALUES (?1, ?2, ?3)",
            params![title, filename, MeetingStatus::Uploaded.as_str()],
        )
        .context("Failed to insert meeting")?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a meeting by ID.
    pub fn get(conn: &Connection, id: i64) -> Result<Option<MeetingRecord>> {
        let mut stmt = conn
            .prepare(&format!("SELECT {COLUMNS} FROM meetings WHERE id = ?1"))
            .context("Failed to prepare meeting query")?;

        let mut rows = stmt
            .query_map(params![id], map_row)
            .context("Failed to query meeting")?;

        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// List all meetings, newest first.
    pub fn list(conn: &Connection) -> Result<Vec<MeetingRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM meetings ORDER BY created_at DESC, id DESC"
            ))
            .context("Failed to prepare meetings list query")?;

        let rows = stmt
            .query_map([], map_row)
            .context("Failed to list meetings")?;

        let mut meetings = Vec::new();
        for row in rows {
            meetings.push(row?);
        }

        Ok(meetings)
    }

    /// Atomically claim the meeting for processing.
    ///
    /// Compare-and-swap on the status column: succeeds (returns true) only
    /// when the current status is not already `processing`, closing the
    /// read-then-write race between concurrent process calls. Clears any
    /// previous error message on success.
    pub fn claim_processing(conn: &Connection, id: i64) -> Result<bool> {
        let affected = conn
            .execute(
                "UPDATE meetings SET status = ?1, error_message = NULL \
                 WHERE id = ?2 AND status != ?1",
                params![MeetingStatus::Processing.as_str(), id],
            )
            .context("Failed to claim meeting for processing")?;

        Ok(affected == 1)
    }

    /// Persist the duration measured during audio extraction.
    pub fn set_duration(conn: &Connection, id: i64, duration_sec: f64) -> Result<()> {
        conn.execute(
            "UPDATE meetings SET duration_sec = ?1 WHERE id = ?2",
            params![duration_sec, id],
        )
        .context("Failed to update meeting duration")?;
        Ok(())
    }

    /// Mark the meeting completed, clearing any error message.
    pub fn complete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute(
            "UPDATE meetings SET status = ?1, error_message = NULL WHERE id = ?2",
            params![MeetingStatus::Completed.as_str(), id],
        )
        .context("Failed to complete meeting")?;
        Ok(())
    }

    /// Mark the meeting failed with an error message.
    pub fn fail(conn: &Connection, id: i64, error: &str) -> Result<()> {
        conn.execute(
            "UPDATE meetings SET status = ?1, error_message = ?2 WHERE id = ?3",
            params![MeetingStatus::Failed.as_str(), error, id],
        )
        .context("Failed to mark meeting as failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_conn;

    #[test]
    fn test_status_round_trip() {
        for status in [
            MeetingStatus::Uploaded,
            MeetingStatus::Processing,
            MeetingStatus::Completed,
            MeetingStatus::Failed,
        ] {
            assert_eq!(MeetingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MeetingStatus::parse("recording"), None);
    }

    #[test]
    fn test_insert_and_get() {
        let conn = test_conn();
        let id = MeetingRepository::insert(&conn, "Standup", "20250101_120000_standup.mp4").unwrap();
        assert!(id > 0);

        let meeting = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(meeting.title, "Standup");
        assert_eq!(meeting.filename, "20250101_120000_standup.mp4");
        assert_eq!(meeting.status, "uploaded");
        assert!(meeting.duration_sec.is_none());
        assert!(meeting.error_message.is_none());
    }

    #[test]
    fn test_get_nonexistent() {
        let conn = test_conn();
        assert!(MeetingRepository::get(&conn, 9999).unwrap().is_none());
    }

    #[test]
    fn test_claim_processing_cas() {
        let conn = test_conn();
        let id = MeetingRepository::insert(&conn, "Test", "test.wav").unwrap();

        // First claim succeeds
        assert!(MeetingRepository::claim_processing(&conn, id).unwrap());
        let meeting = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(meeting.status, "processing");

        // Second claim while processing is rejected
        assert!(!MeetingRepository::claim_processing(&conn, id).unwrap());

        // A failed meeting can be re-claimed
        MeetingRepository::fail(&conn, id, "boom").unwrap();
        assert!(MeetingRepository::claim_processing(&conn, id).unwrap());
    }

    #[test]
    fn test_claim_clears_error_message() {
        let conn = test_conn();
        let id = MeetingRepository::insert(&conn, "Test", "test.wav").unwrap();
        MeetingRepository::fail(&conn, id, "extraction exploded").unwrap();

        assert!(MeetingRepository::claim_processing(&conn, id).unwrap());
        let meeting = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert!(meeting.error_message.is_none());
    }

    #[test]
    fn test_claim_unknown_meeting() {
        let conn = test_conn();
        assert!(!MeetingRepository::claim_processing(&conn, 42).unwrap());
    }

    #[test]
    fn test_complete_and_fail() {
        let conn = test_conn();
        let id = MeetingRepository::insert(&conn, "Test", "test.wav").unwrap();
        MeetingRepository::set_duration(&conn, id, 12.5).unwrap();
        MeetingRepository::complete(&conn, id).unwrap();

        let meeting = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(meeting.status, "completed");
        assert_eq!(meeting.duration_sec, Some(12.5));

        MeetingRepository::fail(&conn, id, "Transcription timeout").unwrap();
        let meeting = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(meeting.status, "failed");
        assert_eq!(meeting.error_message, Some("Transcription timeout".to_string()));
    }

    #[test]
    fn test_list_newest_first() {
        let conn = test_conn();
        MeetingRepository::insert(&conn, "One", "a.wav").unwrap();
        MeetingRepository::insert(&conn, "Two", "b.wav").unwrap();

        let meetings = MeetingRepository::list(&conn).unwrap();
        assert_eq!(meetings.len(), 2);
        assert_eq!(meetings[0].title, "Two");
    }
}
