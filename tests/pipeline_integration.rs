//! End-to-end pipeline scenarios with stub external collaborators.
//!
//! The engine, LLM, and embedder are replaced with deterministic stubs
//! through the same traits production uses; audio extraction, diarization,
//! sentiment, persistence, and the vector index run for real against
//! temporary directories.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use meetscribe::audio::write_mono_wav;
use meetscribe::config::PipelineConfig;
use meetscribe::db::{
    Database, MeetingRepository, SegmentRepository, SummaryRepository, TagRepository,
};
use meetscribe::error::PipelineError;
use meetscribe::index::{Embedder, VectorIndex};
use meetscribe::llm::TextGenerator;
use meetscribe::pipeline::{Pipeline, ProcessOutcome};
use meetscribe::transcription::{Segment, TranscriptOutput, TranscriptionEngine};

/// Engine stub returning a fixed transcript, with an optional delay to hold
/// runs open for concurrency tests.
struct StubEngine {
    segments: Vec<Segment>,
    text: String,
    delay: Duration,
}

impl StubEngine {
    fn speaking() -> Self {
        let segments = vec![
            seg(0.0, 2.0, "Welcome everyone to the planning meeting"),
            seg(2.0, 4.0, "The budget looks great this quarter"),
            seg(4.0, 6.0, "We should hire two more engineers"),
        ];
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            segments,
            text,
            delay: Duration::ZERO,
        }
    }

    fn silent() -> Self {
        Self {
            segments: Vec::new(),
            text: String::new(),
            delay: Duration::ZERO,
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

fn seg(start: f64, end: f64, text: &str) -> Segment {
    Segment {
        start,
        end,
        text: text.to_string(),
    }
}

#[async_trait]
impl TranscriptionEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn transcribe(&self, _wav_path: &Path) -> Result<TranscriptOutput> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(TranscriptOutput {
            segments: self.segments.clone(),
            text: self.text.clone(),
        })
    }
}

/// Generator stub returning a fixed response string.
struct StubGenerator {
    response: String,
    fail: bool,
}

impl StubGenerator {
    fn valid_json() -> Self {
        Self {
            response: r#"{
                "overview": "Planning meeting covering budget and hiring",
                "key_topics": ["budget", "hiring"],
                "decisions": ["hire two engineers"],
                "action_items": ["post job listings"],
                "risks": [],
                "vibe": "optimistic"
            }"#
            .to_string(),
            fail: false,
        }
    }

    fn garbage() -> Self {
        Self {
            response: "I had trouble with that transcript, sorry!".to_string(),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            response: String::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        if self.fail {
            anyhow::bail!("connection refused");
        }
        Ok(self.response.clone())
    }
}

/// Deterministic bag-of-letters embedder.
struct StubEmbedder;

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; 26];
        for c in text.to_lowercase().chars() {
            if c.is_ascii_lowercase() {
                v[(c as u8 - b'a') as usize] += 1.0;
            }
        }
        Ok(v)
    }
}

struct Harness {
    root: tempfile::TempDir,
    db: Database,
    pipeline: Arc<Pipeline>,
    uploads: std::path::PathBuf,
}

fn harness(engine: StubEngine, generator: StubGenerator) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let processed = root.path().join("processed");
    let index_dir = root.path().join("index");
    std::fs::create_dir_all(&uploads).unwrap();

    let db = Database::new(root.path().join("test.db"));
    let index = Arc::new(VectorIndex::open(&index_dir, Arc::new(StubEmbedder)).unwrap());

    let pipeline = Pipeline::new(
        db.clone(),
        uploads.clone(),
        processed,
        Arc::new(engine),
        Arc::new(generator),
        index,
        PipelineConfig::default(),
    );

    Harness {
        root,
        db,
        pipeline,
        uploads,
    }
}

/// Upload a silent WAV and register the meeting row, like the upload
/// endpoint does.
fn upload_silent_wav(h: &Harness, seconds: u32) -> i64 {
    let filename = "20250101_120000_standup.wav";
    let samples = vec![0.0f32; (16_000 * seconds) as usize];
    write_mono_wav(&h.uploads.join(filename), &samples, 16_000).unwrap();

    let conn = h.db.open().unwrap();
    MeetingRepository::insert(&conn, "standup", filename).unwrap()
}

/// Poll until the meeting leaves `processing`, failing the test if it never
/// does.
async fn wait_for_terminal(h: &Harness, meeting_id: i64) -> String {
    for _ in 0..200 {
        let status = {
            let conn = h.db.open().unwrap();
            MeetingRepository::get(&conn, meeting_id)
                .unwrap()
                .unwrap()
                .status
        };
        if status != "processing" {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("meeting {meeting_id} stuck in processing");
}

#[tokio::test(flavor = "multi_thread")]
async fn full_run_completes_and_persists_everything() {
    let h = harness(StubEngine::speaking(), StubGenerator::valid_json());
    let id = upload_silent_wav(&h, 2);

    let outcome = h.pipeline.process(id, false).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Started);

    assert_eq!(wait_for_terminal(&h, id).await, "completed");

    let conn = h.db.open().unwrap();
    let meeting = MeetingRepository::get(&conn, id).unwrap().unwrap();
    assert!(meeting.error_message.is_none());
    // Duration is persisted during extraction; 0.0 only when ffprobe is
    // installed without a usable duration, so just require presence
    assert!(meeting.duration_sec.unwrap() >= 0.0);

    let segments = SegmentRepository::list_for_meeting(&conn, id).unwrap();
    assert_eq!(segments.len(), 3);
    for s in &segments {
        assert!(s.speaker.as_deref().unwrap().starts_with("SPEAKER "));
        let sentiment = s.sentiment.unwrap();
        assert!((-1.0..=1.0).contains(&sentiment));
    }

    let summary = SummaryRepository::get_for_meeting(&conn, id)
        .unwrap()
        .unwrap()
        .decode();
    assert_eq!(summary.overview, "Planning meeting covering budget and hiring");
    assert_eq!(summary.key_topics, vec!["budget", "hiring"]);
    assert!(summary.risks.is_empty());
    assert_eq!(summary.vibe, "optimistic");

    let tags = TagRepository::list_for_meeting(&conn, id).unwrap();
    assert_eq!(tags, vec!["budget", "hiring"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn search_joins_hits_against_stored_segments() {
    let h = harness(StubEngine::speaking(), StubGenerator::valid_json());
    let id = upload_silent_wav(&h, 2);

    h.pipeline.process(id, false).await.unwrap();
    wait_for_terminal(&h, id).await;

    // Segment texts were indexed under (meeting, segment) composite ids
    let conn = h.db.open().unwrap();
    let segments = SegmentRepository::list_for_meeting(&conn, id).unwrap();
    let budget_segment = segments.iter().find(|s| s.text.contains("budget")).unwrap();

    // The pipeline's own index handle is private; assert through the
    // persisted index state instead. The stub embedder is deterministic,
    // so scores are stable.
    let index =
        VectorIndex::open(h.root.path().join("index").as_path(), Arc::new(StubEmbedder)).unwrap();
    let hits = index.search("budget quarter great", 3).await;
    assert!(!hits.is_empty());
    assert_eq!(hits[0].meeting_id, id);
    assert_eq!(hits[0].segment_id, budget_segment.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn second_process_reports_already_completed_without_new_writes() {
    let h = harness(StubEngine::speaking(), StubGenerator::valid_json());
    let id = upload_silent_wav(&h, 2);

    h.pipeline.process(id, false).await.unwrap();
    wait_for_terminal(&h, id).await;

    let ids_before: Vec<i64> = {
        let conn = h.db.open().unwrap();
        SegmentRepository::list_for_meeting(&conn, id)
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect()
    };

    let outcome = h.pipeline.process(id, false).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::AlreadyCompleted);

    let conn = h.db.open().unwrap();
    let ids_after: Vec<i64> = SegmentRepository::list_for_meeting(&conn, id)
        .unwrap()
        .iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids_before, ids_after);
}

#[tokio::test(flavor = "multi_thread")]
async fn force_reprocess_replaces_rows_without_duplicates() {
    let h = harness(StubEngine::speaking(), StubGenerator::valid_json());
    let id = upload_silent_wav(&h, 2);

    h.pipeline.process(id, false).await.unwrap();
    wait_for_terminal(&h, id).await;

    let outcome = h.pipeline.process(id, true).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Started);
    assert_eq!(wait_for_terminal(&h, id).await, "completed");

    let conn = h.db.open().unwrap();
    let segments = SegmentRepository::list_for_meeting(&conn, id).unwrap();
    assert_eq!(segments.len(), 3, "rerun must not accumulate segment rows");

    let tag_count = TagRepository::list_for_meeting(&conn, id).unwrap().len();
    assert_eq!(tag_count, 2, "rerun must not accumulate tag rows");
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_process_is_single_flight() {
    let h = harness(
        StubEngine::speaking().slow(Duration::from_millis(400)),
        StubGenerator::valid_json(),
    );
    let id = upload_silent_wav(&h, 2);

    let first = h.pipeline.process(id, false).await.unwrap();
    assert_eq!(first, ProcessOutcome::Started);

    // While the run holds the transcribe stage, another call is a no-op
    let second = h.pipeline.process(id, false).await.unwrap();
    assert_eq!(second, ProcessOutcome::AlreadyProcessing);

    assert_eq!(wait_for_terminal(&h, id).await, "completed");
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_meeting_is_not_found() {
    let h = harness(StubEngine::speaking(), StubGenerator::valid_json());

    let err = h.pipeline.process(999, false).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(999)));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_upload_fails_with_recorded_error() {
    let h = harness(StubEngine::speaking(), StubGenerator::valid_json());

    let conn = h.db.open().unwrap();
    let id = MeetingRepository::insert(&conn, "ghost", "never_uploaded.mp4").unwrap();
    drop(conn);

    h.pipeline.process(id, false).await.unwrap();
    assert_eq!(wait_for_terminal(&h, id).await, "failed");

    let conn = h.db.open().unwrap();
    let meeting = MeetingRepository::get(&conn, id).unwrap().unwrap();
    assert!(meeting
        .error_message
        .unwrap()
        .contains("Upload file not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_recording_never_sticks_in_processing() {
    let h = harness(StubEngine::silent(), StubGenerator::valid_json());
    let id = upload_silent_wav(&h, 10);

    h.pipeline.process(id, false).await.unwrap();

    let status = wait_for_terminal(&h, id).await;
    assert_eq!(status, "failed");

    let conn = h.db.open().unwrap();
    let meeting = MeetingRepository::get(&conn, id).unwrap().unwrap();
    assert!(meeting
        .error_message
        .unwrap()
        .contains("No transcript segments"));
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_upload_fails_with_aggregated_extraction_error() {
    let h = harness(StubEngine::speaking(), StubGenerator::valid_json());

    let filename = "20250101_120000_broken.mkv";
    std::fs::write(h.uploads.join(filename), b"not actually a video").unwrap();
    let conn = h.db.open().unwrap();
    let id = MeetingRepository::insert(&conn, "broken", filename).unwrap();
    drop(conn);

    h.pipeline.process(id, false).await.unwrap();
    assert_eq!(wait_for_terminal(&h, id).await, "failed");

    let conn = h.db.open().unwrap();
    let message = MeetingRepository::get(&conn, id)
        .unwrap()
        .unwrap()
        .error_message
        .unwrap();
    assert!(message.contains("extraction failed"), "{message}");
    // Every strategy in the fallback chain left its failure cause
    assert!(message.contains("ffmpeg"), "{message}");
    assert!(message.contains("symphonia demux"), "{message}");
    assert!(message.contains("wav"), "{message}");
    assert!(message.contains("decode+resample"), "{message}");
}

#[tokio::test(flavor = "multi_thread")]
async fn llm_outage_fails_run_but_keeps_segments() {
    let h = harness(StubEngine::speaking(), StubGenerator::failing());
    let id = upload_silent_wav(&h, 2);

    h.pipeline.process(id, false).await.unwrap();
    assert_eq!(wait_for_terminal(&h, id).await, "failed");

    let conn = h.db.open().unwrap();
    let meeting = MeetingRepository::get(&conn, id).unwrap().unwrap();
    assert!(meeting.error_message.unwrap().contains("connection refused"));

    // Earlier stages' persisted state is kept, not rolled back
    assert_eq!(SegmentRepository::list_for_meeting(&conn, id).unwrap().len(), 3);
    assert!(SummaryRepository::get_for_meeting(&conn, id).unwrap().is_none());

    // A retry after the outage succeeds
    drop(conn);
    // (the failed status allows a fresh claim without force)
    let outcome = h.pipeline.process(id, false).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Started);
    assert_eq!(wait_for_terminal(&h, id).await, "failed");
}

#[tokio::test(flavor = "multi_thread")]
async fn garbage_llm_response_still_completes_with_fallback_summary() {
    let h = harness(StubEngine::speaking(), StubGenerator::garbage());
    let id = upload_silent_wav(&h, 2);

    h.pipeline.process(id, false).await.unwrap();
    assert_eq!(wait_for_terminal(&h, id).await, "completed");

    let conn = h.db.open().unwrap();
    let summary = SummaryRepository::get_for_meeting(&conn, id)
        .unwrap()
        .unwrap()
        .decode();
    assert!(summary.overview.starts_with("I had trouble"));
    assert!(summary.key_topics.is_empty());
    assert_eq!(summary.vibe, "neutral");

    // With no summary topics, tags fall back to transcript keywords
    let tags = TagRepository::list_for_meeting(&conn, id).unwrap();
    assert!(!tags.is_empty());
    assert!(tags.iter().any(|t| t == "budget" || t == "engineers" || t == "planning"));
}
