//! The meeting processing pipeline.
//!
//! One `process` call starts (or refuses to start) one background run for a
//! meeting. A run walks the stages strictly in order, persisting each
//! stage's output before the next begins: extract audio, transcribe,
//! diarize + score sentiment, persist segments, summarize, persist
//! summary/tags, upsert the vector index, then flip the status to
//! `completed`. Any stage error aborts the rest of the run and is persisted
//! as a `failed` status with the error's message; already-persisted partial
//! state is kept.
//!
//! Concurrency: runs for different meetings may overlap freely. Runs for the
//! same meeting are single-flight, enforced twice: an in-process set of
//! active meeting ids, and an atomic status claim at the storage layer. The
//! shared transcription engine is serialized across all runs with a mutex
//! held for the transcribe stage only.

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::audio::AudioExtractor;
use crate::config::PipelineConfig;
use crate::db::{
    Database, MeetingRepository, MeetingStatus, SegmentRepository, SummaryRepository,
    TagRepository,
};
use crate::db::segments::NewSegment;
use crate::error::{PipelineError, PipelineResult};
use crate::index::VectorIndex;
use crate::llm::{summarize_and_extract, TextGenerator};
use crate::transcription::{Transcriber, TranscriptionEngine};
use crate::{diarization, sentiment, topics};

/// Persisted failure messages are capped at this many characters.
const MAX_ERROR_CHARS: usize = 2000;

/// Synchronous answer to a `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Started,
    AlreadyProcessing,
    AlreadyCompleted,
}

impl ProcessOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "processing started",
            Self::AlreadyProcessing => "already processing",
            Self::AlreadyCompleted => "already completed",
        }
    }
}

pub struct Pipeline {
    db: Database,
    uploads_dir: PathBuf,
    processed_dir: PathBuf,
    extractor: Arc<AudioExtractor>,
    transcriber: Transcriber,
    /// Serializes access to the shared (possibly stateful) engine.
    transcribe_lock: Mutex<()>,
    generator: Arc<dyn TextGenerator>,
    index: Arc<VectorIndex>,
    config: PipelineConfig,
    /// Meeting ids with an active run in this process.
    in_flight: Mutex<HashSet<i64>>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        uploads_dir: PathBuf,
        processed_dir: PathBuf,
        engine: Arc<dyn TranscriptionEngine>,
        generator: Arc<dyn TextGenerator>,
        index: Arc<VectorIndex>,
        config: PipelineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            uploads_dir,
            processed_dir,
            extractor: Arc::new(AudioExtractor::new()),
            transcriber: Transcriber::new(engine),
            transcribe_lock: Mutex::new(()),
            generator,
            index,
            config,
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Start or refuse a run for one meeting.
    ///
    /// `processing` status is a no-op; `completed` is a no-op unless `force`.
    /// On start, the heavy work runs as a spawned background task and this
    /// call returns immediately.
    pub async fn process(
        self: &Arc<Self>,
        meeting_id: i64,
        force: bool,
    ) -> PipelineResult<ProcessOutcome> {
        let meeting = self
            .with_db(move |conn| MeetingRepository::get(conn, meeting_id))
            .await?
            .ok_or(PipelineError::NotFound(meeting_id))?;

        match MeetingStatus::parse(&meeting.status) {
            Some(MeetingStatus::Processing) => return Ok(ProcessOutcome::AlreadyProcessing),
            Some(MeetingStatus::Completed) if !force => {
                return Ok(ProcessOutcome::AlreadyCompleted)
            }
            _ => {}
        }

        // In-process guard first, storage-layer CAS second. The set closes
        // the window between the status read above and the claim below; the
        // CAS is authoritative even across processes.
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(meeting_id) {
                return Ok(ProcessOutcome::AlreadyProcessing);
            }
        }

        let claimed = match self
            .with_db(move |conn| MeetingRepository::claim_processing(conn, meeting_id))
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                self.in_flight.lock().await.remove(&meeting_id);
                return Err(e);
            }
        };

        if !claimed {
            self.in_flight.lock().await.remove(&meeting_id);
            return Ok(ProcessOutcome::AlreadyProcessing);
        }

        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            pipeline.run(meeting_id).await;
        });

        Ok(ProcessOutcome::Started)
    }

    /// Execute one run, converting any stage error into a persisted `failed`
    /// status. Never panics the worker; a failing failure-write is logged
    /// and swallowed, leaving a stale `processing` status for operators.
    async fn run(self: Arc<Self>, meeting_id: i64) {
        info!("Starting processing for meeting {}", meeting_id);

        if let Err(e) = self.run_stages(meeting_id).await {
            error!("Processing failed for meeting {}: {:#}", meeting_id, e);

            let message: String = e.to_string().chars().take(MAX_ERROR_CHARS).collect();
            let record = self
                .with_db(move |conn| MeetingRepository::fail(conn, meeting_id, &message))
                .await;
            if let Err(db_err) = record {
                error!(
                    "Failed to record failure for meeting {}: {:#}",
                    meeting_id, db_err
                );
            }
        }

        self.in_flight.lock().await.remove(&meeting_id);
    }

    async fn run_stages(&self, meeting_id: i64) -> PipelineResult<()> {
        let meeting = self
            .with_db(move |conn| MeetingRepository::get(conn, meeting_id))
            .await?
            .ok_or(PipelineError::NotFound(meeting_id))?;

        // Stage 1: resolve the stored upload
        let input_path = self.uploads_dir.join(&meeting.filename);
        if !input_path.exists() {
            return Err(PipelineError::MissingInput(input_path));
        }

        // Stage 2: extract audio, persist duration immediately
        info!("Extracting audio from {:?}", input_path);
        let (wav_path, duration) = {
            let extractor = Arc::clone(&self.extractor);
            let processed_dir = self.processed_dir.clone();
            let target_rate = self.config.target_sample_rate;
            let input = input_path.clone();
            tokio::task::spawn_blocking(move || {
                extractor.extract(&input, &processed_dir, target_rate)
            })
            .await
            .map_err(|e| anyhow!("Extraction task panicked: {e}"))?
            .map_err(|e| PipelineError::ExtractionFailed(format!("{e:#}")))?
        };
        self.with_db(move |conn| MeetingRepository::set_duration(conn, meeting_id, duration))
            .await?;
        info!("Audio extracted, duration: {:.1}s", duration);

        // Stage 3: transcribe (shared engine, serialized)
        let segments = {
            let _engine_guard = self.transcribe_lock.lock().await;
            self.transcriber
                .transcribe(&wav_path, &self.processed_dir)
                .await
                .map_err(|e| PipelineError::ExternalService(format!("{e:#}")))?
        };
        info!("Transcription completed, {} segments", segments.len());

        if segments.is_empty() {
            return Err(PipelineError::EmptyTranscript);
        }

        // Stage 4: diarize and score sentiment, both keyed by segment index
        info!("Assigning speakers...");
        let speakers = {
            let wav = wav_path.clone();
            let segs = segments.clone();
            let max_speakers = self.config.max_speakers;
            tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
                let (samples, sample_rate) = crate::audio::load_wav(&wav)?;
                diarization::assign_speakers(&samples, sample_rate, &segs, max_speakers)
            })
            .await
            .map_err(|e| anyhow!("Diarization task panicked: {e}"))?
            .context("Speaker assignment failed")?
        };

        info!("Scoring sentiment...");
        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        let sentiments = sentiment::score_segments(&texts);

        // Stage 5: persist all segments as one batch. A forced rerun drops
        // the previous run's rows here instead of accumulating duplicates.
        info!("Persisting {} segments...", segments.len());
        let new_segments: Vec<NewSegment> = segments
            .iter()
            .zip(speakers.iter())
            .zip(sentiments.iter())
            .map(|((seg, speaker), &sentiment)| NewSegment {
                start: seg.start,
                end: seg.end,
                text: seg.text.clone(),
                speaker: Some(speaker.clone()),
                sentiment: Some(sentiment),
            })
            .collect();
        let records = self
            .with_db(move |conn| {
                SegmentRepository::delete_for_meeting(conn, meeting_id)?;
                SummaryRepository::delete_for_meeting(conn, meeting_id)?;
                TagRepository::delete_for_meeting(conn, meeting_id)?;
                SegmentRepository::insert_batch(conn, meeting_id, &new_segments)
            })
            .await?;

        // Stage 6: flatten and summarize
        info!("Generating summary...");
        let full_transcript = records
            .iter()
            .map(|r| {
                format!(
                    "[{:.1}-{:.1}] {}: {}",
                    r.start,
                    r.end,
                    r.speaker.as_deref().unwrap_or("SPEAKER"),
                    r.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let summary = summarize_and_extract(
            self.generator.as_ref(),
            &full_transcript,
            self.config.summary_char_budget,
        )
        .await
        .map_err(|e| PipelineError::ExternalService(format!("{e:#}")))?;

        // Stage 7: persist summary, then tags from its topics (falling back
        // to transcript keywords when the summary has none)
        info!("Extracting topics...");
        let tag_names = if summary.key_topics.is_empty() {
            topics::simple_keywords(&full_transcript, self.config.fallback_topic_count)
        } else {
            summary.key_topics.clone()
        };
        self.with_db(move |conn| {
            SummaryRepository::replace(conn, meeting_id, &summary)?;
            TagRepository::insert_many(conn, meeting_id, &tag_names)
        })
        .await?;

        // Stage 8: upsert the vector index
        info!("Creating vector embeddings...");
        let indexed: Vec<(i64, String)> = records.iter().map(|r| (r.id, r.text.clone())).collect();
        self.index
            .upsert_meeting_segments(meeting_id, &meeting.title, &indexed)
            .await
            .map_err(|e| PipelineError::ExternalService(format!("{e:#}")))?;

        // Stage 9: terminal status
        self.with_db(move |conn| MeetingRepository::complete(conn, meeting_id))
            .await?;
        info!("Processing completed successfully for meeting {}", meeting_id);

        Ok(())
    }

    /// Run a closure against a fresh short-lived connection on the blocking
    /// pool.
    async fn with_db<T, F>(&self, f: F) -> PipelineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<T> {
            let mut conn = db.open()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| anyhow!("Database task panicked: {e}"))?;

        result.map_err(PipelineError::from)
    }
}
