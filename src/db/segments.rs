//! Transcript segment persistence.
//!
//! Segments are written once per pipeline run as a single batch and never
//! mutated in place afterward; a forced rerun deletes the old batch first.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

/// A persisted transcript segment.
#[derive(Debug, Clone)]
pub struct SegmentRecord {
    pub id: i64,
    pub meeting_id: i64,
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub speaker: Option<String>,
    pub sentiment: Option<f64>,
}

/// Row data for a batch insert, before identities are assigned.
#[derive(Debug, Clone)]
pub struct NewSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub speaker: Option<String>,
    pub sentiment: Option<f64>,
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SegmentRecord> {
    Ok(SegmentRecord {
        id: row.get(0)?,
        meeting_id: row.get(1)?,
        start: row.get(2)?,
        end: row.get(3)?,
        text: row.get(4)?,
        speaker: row.get(5)?,
        sentiment: row.get(6)?,
    })
}

/// Repository for transcript segments.
pub struct SegmentRepository;

impl SegmentRepository {
    /// Insert one batch of segments in a single transaction, returning the
    /// persisted records with their assigned identities, in input order.
    pub fn insert_batch(
        conn: &mut Connection,
        meeting_id: i64,
        segments: &[NewSegment],
    ) -> Result<Vec<SegmentRecord>> {
        let tx = conn
            .transaction()
            .context("Failed to begin segment batch transaction")?;

        let mut records = Vec::with_capacity(segments.len());
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO segments (meeting_id, start, \"end\", text, speaker, sentiment) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .context("Failed to prepare segment insert")?;

            for seg in segments {
                stmt.execute(params![
                    meeting_id,
                    seg.start,
                    seg.end,
                    seg.text,
                    seg.speaker,
                    seg.sentiment,
                ])
                .context("Failed to insert segment")?;

                records.push(SegmentRecord {
                    id: tx.last_insert_rowid(),
                    meeting_id,
                    start: seg.start,
                    end: seg.end,
                    text: seg.text.clone(),
                    speaker: seg.speaker.clone(),
                    sentiment: seg.sentiment,
                });
            }
        }

        tx.commit().context("Failed to commit segment batch")?;
        Ok(records)
    }

    /// Get one segment by ID.
    pub fn get(conn: &Connection, id: i64) -> Result<Option<SegmentRecord>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, meeting_id, start, \"end\", text, speaker, sentiment \
                 FROM segments WHERE id = ?1",
            )
            .context("Failed to prepare segment query")?;

        let mut rows = stmt
            .query_map(params![id], map_row)
            .context("Failed to query segment")?;

        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// List a meeting's segments in timeline order.
    pub fn list_for_meeting(conn: &Connection, meeting_id: i64) -> Result<Vec<SegmentRecord>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, meeting_id, start, \"end\", text, speaker, sentiment \
                 FROM segments WHERE meeting_id = ?1 ORDER BY start, id",
            )
            .context("Failed to prepare segments list query")?;

        let rows = stmt
            .query_map(params![meeting_id], map_row)
            .context("Failed to list segments")?;

        let mut segments = Vec::new();
        for row in rows {
            segments.push(row?);
        }

        Ok(segments)
    }

    /// Delete all segments for a meeting. Returns the number removed.
    pub fn delete_for_meeting(conn: &Connection, meeting_id: i64) -> Result<usize> {
        conn.execute(
            "DELETE FROM segments WHERE meeting_id = ?1",
            params![meeting_id],
        )
        .context("Failed to delete segments")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_conn, MeetingRepository};

    fn sample(text: &str, start: f64, end: f64) -> NewSegment {
        NewSegment {
            start,
            end,
            text: text.to_string(),
            speaker: Some("SPEAKER 1".to_string()),
            sentiment: Some(0.4),
        }
    }

    #[test]
    fn test_insert_batch_assigns_ids_in_order() {
        let mut conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, "Test", "t.wav").unwrap();

        let records = SegmentRepository::insert_batch(
            &mut conn,
            meeting_id,
            &[sample("first", 0.0, 1.0), sample("second", 1.0, 2.5)],
        )
        .unwrap();

        assert_eq!(records.len(), 2);
        assert!(records[0].id < records[1].id);
        assert_eq!(records[0].text, "first");
        assert_eq!(records[1].end, 2.5);
    }

    #[test]
    fn test_list_timeline_order() {
        let mut conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, "Test", "t.wav").unwrap();

        SegmentRepository::insert_batch(
            &mut conn,
            meeting_id,
            &[sample("late", 5.0, 6.0), sample("early", 0.0, 1.0)],
        )
        .unwrap();

        let segments = SegmentRepository::list_for_meeting(&conn, meeting_id).unwrap();
        assert_eq!(segments[0].text, "early");
        assert_eq!(segments[1].text, "late");
    }

    #[test]
    fn test_delete_for_meeting() {
        let mut conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, "Test", "t.wav").unwrap();
        let other_id = MeetingRepository::insert(&conn, "Other", "o.wav").unwrap();

        SegmentRepository::insert_batch(&mut conn, meeting_id, &[sample("a", 0.0, 1.0)]).unwrap();
        SegmentRepository::insert_batch(&mut conn, other_id, &[sample("b", 0.0, 1.0)]).unwrap();

        let removed = SegmentRepository::delete_for_meeting(&conn, meeting_id).unwrap();
        assert_eq!(removed, 1);
        assert!(SegmentRepository::list_for_meeting(&conn, meeting_id)
            .unwrap()
            .is_empty());
        assert_eq!(
            SegmentRepository::list_for_meeting(&conn, other_id).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_nullable_speaker_and_sentiment() {
        let mut conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, "Test", "t.wav").unwrap();

        let records = SegmentRepository::insert_batch(
            &mut conn,
            meeting_id,
            &[NewSegment {
                start: 0.0,
                end: 1.0,
                text: "unlabeled".to_string(),
                speaker: None,
                sentiment: None,
            }],
        )
        .unwrap();

        let fetched = SegmentRepository::get(&conn, records[0].id).unwrap().unwrap();
        assert!(fetched.speaker.is_none());
        assert!(fetched.sentiment.is_none());
    }
}
