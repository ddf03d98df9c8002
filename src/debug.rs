//! Request/response audio dumps for troubleshooting devices
//!
//! Writes happen on a detached task; a failed write is logged and otherwise
//! ignored.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::DebugConfig;
use crate::pipeline::PipelineOutcome;

/// Transcript file contents
#[derive(Debug, Clone, Serialize)]
pub struct DebugTranscript {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub transcript: Option<String>,
    pub reply: Option<String>,
    pub spoken: Option<String>,
    pub error: Option<String>,
}

impl DebugTranscript {
    /// Summarize a pipeline outcome
    #[must_use]
    pub fn from_outcome(request_id: Uuid, outcome: &PipelineOutcome) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
            status: outcome.status.to_string(),
            transcript: outcome.trace.transcript.clone(),
            reply: outcome.trace.reply.as_ref().map(|r| r.text().to_string()),
            spoken: outcome.trace.spoken.clone(),
            error: outcome.trace.error.clone(),
        }
    }
}

/// One request worth of debug output
#[derive(Debug, Clone)]
pub struct DebugRecord {
    /// Device audio as WAV
    pub request_wav: Vec<u8>,

    /// Reply audio as WAV, absent when synthesis failed
    pub response_wav: Option<Vec<u8>>,

    pub transcript: DebugTranscript,
}

/// Persists debug records under a directory
#[derive(Debug, Clone)]
pub struct DebugRecorder {
    dir: PathBuf,
}

impl DebugRecorder {
    /// Create a recorder writing into `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Recorder for the configuration, `None` when dumps are disabled
    #[must_use]
    pub fn from_config(config: &DebugConfig) -> Option<Self> {
        config.enabled.then(|| Self::new(&config.dir))
    }

    /// Directory records are written to
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a record in the background
    pub fn record(&self, record: DebugRecord) -> JoinHandle<()> {
        let dir = self.dir.clone();
        tokio::spawn(async move {
            let request_id = record.transcript.request_id;
            if let Err(e) = write_record(&dir, record).await {
                tracing::warn!(error = %e, request_id = %request_id, dir = %dir.display(), "failed to write debug audio");
            }
        })
    }
}

async fn write_record(dir: &Path, record: DebugRecord) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;

    let stem = format!(
        "{}_{}",
        record.transcript.timestamp.format("%Y%m%dT%H%M%S"),
        record.transcript.request_id
    );

    tokio::fs::write(dir.join(format!("{stem}_request.wav")), &record.request_wav).await?;
    if let Some(response) = &record.response_wav {
        tokio::fs::write(dir.join(format!("{stem}_response.wav")), response).await?;
    }

    let json = serde_json::to_vec_pretty(&record.transcript)?;
    tokio::fs::write(dir.join(format!("{stem}_transcript.json")), json).await?;

    tracing::debug!(request_id = %record.transcript.request_id, dir = %dir.display(), "wrote debug audio");
    Ok(())
}
