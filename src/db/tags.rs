//! Topic tag persistence. One row per topic; duplicates across meetings are
//! expected and no dedup happens within a meeting.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

/// Tag names longer than this are truncated before insert.
const MAX_TAG_LEN: usize = 64;

/// Repository for meeting tags.
pub struct TagRepository;

impl TagRepository {
    /// Insert one tag per name, truncating to the column limit.
    pub fn insert_many(conn: &Connection, meeting_id: i64, names: &[String]) -> Result<()> {
        let mut stmt = conn
            .prepare("INSERT INTO tags (meeting_id, name) VALUES (?1, ?2)")
            .context("Failed to prepare tag insert")?;

        for name in names {
            let truncated: String = name.chars().take(MAX_TAG_LEN).collect();
            stmt.execute(params![meeting_id, truncated])
                .context("Failed to insert tag")?;
        }

        Ok(())
    }

    /// List a meeting's tag names in insertion order.
    pub fn list_for_meeting(conn: &Connection, meeting_id: i64) -> Result<Vec<String>> {
        let mut stmt = conn
            .prepare("SELECT name FROM tags WHERE meeting_id = ?1 ORDER BY id")
            .context("Failed to prepare tags query")?;

        let rows = stmt
            .query_map(params![meeting_id], |row| row.get::<_, String>(0))
            .context("Failed to list tags")?;

        let mut tags = Vec::new();
        for row in rows {
            tags.push(row?);
        }

        Ok(tags)
    }

    /// Delete all tags for a meeting. Returns the number removed.
    pub fn delete_for_meeting(conn: &Connection, meeting_id: i64) -> Result<usize> {
        conn.execute("DELETE FROM tags WHERE meeting_id = ?1", params![meeting_id])
            .context("Failed to delete tags")
    }
}
