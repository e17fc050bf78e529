//! Voice processor: audio → transcription → structured fields.
//!
//! Owns the fallback policy. Transcription failure is terminal for the
//! message; extraction failure degrades to a transcription-only result.
//! Every service call is bounded by its own timeout and attempted once.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use sha2::{Digest, Sha256};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::adapters::{ExtractionOutcome, Extractor, Transcriber, TranscriptionError};
use crate::domain::{ProcessingResult, FIELD_SCHEMA};

/// Default language hint (Hebrew)
pub const DEFAULT_LANGUAGE: &str = "he";

/// Per-call timeouts for the two AI services
#[derive(Debug, Clone, Copy)]
pub struct ServiceTimeouts {
    pub transcription: Duration,
    pub extraction: Duration,
}

impl Default for ServiceTimeouts {
    fn default() -> Self {
        Self {
            transcription: Duration::from_secs(120),
            extraction: Duration::from_secs(60),
        }
    }
}

/// Per-message processing parameters
#[derive(Debug, Clone)]
pub struct AudioRequest {
    /// Language hint for transcription
    pub language: String,

    /// Date used to resolve relative day expressions (today when absent)
    pub reference_date: Option<NaiveDate>,

    /// Sender, used to name archived audio
    pub sender: String,

    /// Persist the raw audio before transcribing
    pub archive: bool,
}

impl Default for AudioRequest {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            reference_date: None,
            sender: "unknown".to_string(),
            archive: false,
        }
    }
}

/// Directory where raw voice messages are kept for inspection
#[derive(Debug, Clone)]
pub struct VoiceArchive {
    dir: PathBuf,
}

impl VoiceArchive {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Write the audio as `voice_{sender}_{timestamp}_{hash}.ogg`
    pub async fn save(&self, audio: &[u8], sender: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create voice archive: {}", self.dir.display()))?;

        let mut hasher = Sha256::new();
        hasher.update(audio);
        let hash = format!("{:x}", hasher.finalize());

        let file_name = format!(
            "voice_{}_{}_{}.ogg",
            sender,
            Local::now().format("%Y%m%d_%H%M%S"),
            &hash[..8]
        );
        let path = self.dir.join(file_name);

        tokio::fs::write(&path, audio)
            .await
            .with_context(|| format!("Failed to archive voice message: {}", path.display()))?;

        Ok(path)
    }
}

/// Orchestrates transcription and extraction into one [`ProcessingResult`]
pub struct VoiceProcessor {
    transcriber: Arc<dyn Transcriber>,
    /// When absent every successful transcription falls back
    extractor: Option<Arc<dyn Extractor>>,
    archive: Option<VoiceArchive>,
    timeouts: ServiceTimeouts,
}

impl VoiceProcessor {
    pub fn new(transcriber: Arc<dyn Transcriber>, extractor: Option<Arc<dyn Extractor>>) -> Self {
        Self {
            transcriber,
            extractor,
            archive: None,
            timeouts: ServiceTimeouts::default(),
        }
    }

    pub fn with_archive(mut self, archive: VoiceArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_timeouts(mut self, timeouts: ServiceTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Run one audio payload through the pipeline
    pub async fn process_audio(&self, audio: &[u8], request: &AudioRequest) -> ProcessingResult {
        if request.archive {
            self.archive_audio(audio, &request.sender).await;
        }

        let text = match self.transcribe(audio, &request.language).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, transcriber = self.transcriber.name(), "Transcription failed");
                return ProcessingResult::failed(e.to_string());
            }
        };

        info!(chars = text.chars().count(), "Audio transcribed");

        let reference_date = request
            .reference_date
            .unwrap_or_else(|| Local::now().date_naive());

        match self.extract(&text, reference_date).await {
            ExtractionOutcome::Fields(mut fields) => {
                if fields.recording_date.is_empty() {
                    fields.recording_date = reference_date.format("%d/%m/%Y").to_string();
                }
                info!("Workday fields extracted");
                ProcessingResult::success(text, fields)
            }
            ExtractionOutcome::Malformed(reason) => {
                warn!(%reason, "Extraction response malformed, keeping raw transcription");
                ProcessingResult::fallback(text)
            }
            ExtractionOutcome::ServiceError(reason) => {
                warn!(%reason, "Extraction unavailable, keeping raw transcription");
                ProcessingResult::fallback(text)
            }
        }
    }

    /// Transcribe only, under the transcription timeout
    pub async fn transcribe_only(&self, audio: &[u8], language: &str) -> Result<String, TranscriptionError> {
        self.transcribe(audio, language).await
    }

    async fn archive_audio(&self, audio: &[u8], sender: &str) {
        let Some(archive) = &self.archive else {
            warn!("Audio archiving requested but no archive directory configured");
            return;
        };

        match archive.save(audio, sender).await {
            Ok(path) => info!(path = %path.display(), "Voice message archived"),
            Err(e) => warn!(error = %e, "Failed to archive voice message"),
        }
    }

    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, TranscriptionError> {
        let limit = self.timeouts.transcription;
        let text = timeout(limit, self.transcriber.transcribe(audio, language))
            .await
            .map_err(|_| TranscriptionError::Timeout(limit))??;

        if text.trim().is_empty() {
            return Err(TranscriptionError::Empty);
        }
        Ok(text)
    }

    async fn extract(&self, text: &str, reference_date: NaiveDate) -> ExtractionOutcome {
        let Some(extractor) = &self.extractor else {
            return ExtractionOutcome::ServiceError("no extractor configured".to_string());
        };

        let limit = self.timeouts.extraction;
        match timeout(limit, extractor.extract(text, &FIELD_SCHEMA, reference_date)).await {
            Ok(outcome) => outcome,
            Err(_) => ExtractionOutcome::ServiceError(format!("extraction timed out after {:?}", limit)),
        }
    }
}
