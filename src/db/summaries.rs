//! Summary persistence.
//!
//! At most one summary per meeting (UNIQUE on meeting_id). The four list
//! fields are stored as JSON-serialized string arrays and must round-trip
//! exactly through encode/decode.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::llm::MeetingSummary;

/// A persisted summary row, list fields still JSON-encoded.
#[derive(Debug, Clone)]
pub struct SummaryRecord {
    pub id: i64,
    pub meeting_id: i64,
    pub overview: String,
    pub key_topics: String,
    pub decisions: String,
    pub action_items: String,
    pub risks: Option<String>,
    pub vibe: Option<String>,
}

impl SummaryRecord {
    /// Decode the JSON list columns back into a structured summary.
    /// NULL or empty columns decode as empty lists; vibe defaults to neutral.
    pub fn decode(&self) -> MeetingSummary {
        fn list(json: &str) -> Vec<String> {
            serde_json::from_str(json).unwrap_or_default()
        }

        MeetingSummary {
            overview: self.overview.clone(),
            key_topics: list(&self.key_topics),
            decisions: list(&self.decisions),
            action_items: list(&self.action_items),
            risks: self.risks.as_deref().map(list).unwrap_or_default(),
            vibe: self
                .vibe
                .clone()
                .unwrap_or_else(|| "neutral".to_string()),
        }
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SummaryRecord> {
    Ok(SummaryRecord {
        id: row.get(0)?,
        meeting_id: row.get(1)?,
        overview: row.get(2)?,
        key_topics: row.get(3)?,
        decisions: row.get(4)?,
        action_items: row.get(5)?,
        risks: row.get(6)?,
        vibe: row.get(7)?,
    })
}

/// Repository for meeting summaries.
pub struct SummaryRepository;

impl SummaryRepository {
    /// Replace the meeting's summary (delete old row, insert new one).
    pub fn replace(conn: &Connection, meeting_id: i64, summary: &MeetingSummary) -> Result<i64> {
        conn.execute(
            "DELETE FROM summaries WHERE meeting_id = ?1",
            params![meeting_id],
        )
        .context("Failed to delete previous summary")?;

        conn.execute(
            "INSERT INTO summaries \
             (meeting_id, overview, key_topics, decisions, action_items, risks, vibe) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                meeting_id,
                summary.overview,
                serde_json::to_string(&summary.key_topics)?,
                serde_json::to_string(&summary.decisions)?,
                serde_json::to_string(&summary.action_items)?,
                serde_json::to_string(&summary.risks)?,
                summary.vibe,
            ],
        )
        .context("Failed to insert summary")?;

        Ok(conn.last_insert_rowid())
    }

    /// Get the summary for a meeting, if one exists.
    pub fn get_for_meeting(conn: &Connection, meeting_id: i64) -> Result<Option<SummaryRecord>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, meeting_id, overview, key_topics, decisions, action_items, \
                 risks, vibe FROM summaries WHERE meeting_id = ?1",
            )
            .context("Failed to prepare summary query")?;

        let mut rows = stmt
            .query_map(params![meeting_id], map_row)
            .context("Failed to query summary")?;

        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Delete the meeting's summary, if any.
    pub fn delete_for_meeting(conn: &Connection, meeting_id: i64) -> Result<usize> {
        conn.execute(
            "DELETE FROM summaries WHERE meeting_id = ?1",
            params![meeting_id],
        )
        .context("Failed to delete summary")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_conn, MeetingRepository};

    fn summary() -> MeetingSummary {
        MeetingSummary {
            overview: "Quarterly planning recap".to_string(),
            key_topics: vec!["budget".to_string(), "hiring".to_string()],
            decisions: vec!["freeze travel".to_string()],
            action_items: vec!["draft headcount plan".to_string()],
            risks: vec![],
            vibe: "focused".to_string(),
        }
    }

    #[test]
    fn test_round_trip_exact() {
        let conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, "Q3", "q3.mp4").unwrap();

        let original = summary();
        SummaryRepository::replace(&conn, meeting_id, &original).unwrap();

        let record = SummaryRepository::get_for_meeting(&conn, meeting_id)
            .unwrap()
            .unwrap();
        let decoded = record.decode();

        assert_eq!(decoded.overview, original.overview);
        assert_eq!(decoded.key_topics, original.key_topics);
        assert_eq!(decoded.decisions, original.decisions);
        assert_eq!(decoded.action_items, original.action_items);
        // Empty risks list survives the round trip
        assert_eq!(decoded.risks, original.risks);
        assert_eq!(decoded.vibe, original.vibe);
    }

    #[test]
    fn test_unique_per_meeting() {
        let conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, "Q3", "q3.mp4").unwrap();

        SummaryRepository::replace(&conn, meeting_id, &summary()).unwrap();
        let mut second = summary();
        second.overview = "Updated".to_string();
        SummaryRepository::replace(&conn, meeting_id, &second).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM summaries WHERE meeting_id = ?1",
                params![meeting_id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        let record = SummaryRepository::get_for_meeting(&conn, meeting_id)
            .unwrap()
            .unwrap();
        assert_eq!(record.overview, "Updated");
    }

    #[test]
    fn test_decode_null_risks_and_vibe() {
        let conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, "Q3", "q3.mp4").unwrap();

        conn.execute(
            "INSERT INTO summaries (meeting_id, overview, key_topics, decisions, action_items) \
             VALUES (?1, 'legacy row', '[]', '[]', '[]')",
            params![meeting_id],
        )
        .unwrap();

        let decoded = SummaryRepository::get_for_meeting(&conn, meeting_id)
            .unwrap()
            .unwrap()
            .decode();
        assert!(decoded.risks.is_empty());
        assert_eq!(decoded.vibe, "neutral");
    }

    #[test]
    fn test_missing_summary() {
        let conn = test_conn();
        assert!(SummaryRepository::get_for_meeting(&conn, 1).unwrap().is_none());
    }
}
