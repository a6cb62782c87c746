//! Typed errors for the processing pipeline.
//!
//! Stage-local recoveries (malformed summary JSON, failed query embeddings)
//! never surface here; everything else aborts the run and is persisted as a
//! `failed` status with the error's message.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Meeting {0} not found")]
    NotFound(i64),

    #[error("Upload file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Audio extraction failed with all methods: {0}")]
    ExtractionFailed(String),

    #[error("No transcript segments generated")]
    EmptyTranscript,

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
