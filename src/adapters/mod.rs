//! Adapter interfaces for external systems.
//!
//! The pipeline talks to four collaborators through these traits:
//! the message source (Telegram), the transcription and extraction
//! services (OpenAI), and the record store (Google Sheets or a local
//! JSONL file).

pub mod jsonl;
pub mod openai;
pub mod sheets;
pub mod telegram;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{AudioRef, UpdatePage, UpdateQuery, WorkdayFields, WorkdayRecord};

// Re-export the concrete adapters
pub use jsonl::JsonlRecordStore;
pub use openai::{OpenAiClient, OpenAiExtractor, WhisperTranscriber};
pub use sheets::{ServiceAccountKey, SheetsRecordStore};
pub use telegram::{TelegramClient, TelegramConfig};

/// Identifier of an appended row (range, line number, ...)
pub type RowId = String;

/// Transcription failures. None of these are retried by the pipeline.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Transcription returned no text")]
    Empty,

    #[error("Transcription timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transcription request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transcription service error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a structured extraction call.
///
/// Only `Fields` yields a non-fallback record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// Well-formed response mapped onto the schema
    Fields(WorkdayFields),

    /// Response arrived but did not fit the schema
    Malformed(String),

    /// Service failed or timed out
    ServiceError(String),
}

/// Record store failures
#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("Append timed out after {0:?}")]
    Timeout(Duration),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Append request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Record store error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Speech-to-text service
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Human-readable service name
    fn name(&self) -> &str;

    /// Transcribe audio bytes with a language hint (ISO 639-1)
    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, TranscriptionError>;
}

/// Structured field extraction service
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    /// Extract `schema` fields from `text`, resolving relative days against `reference_date`
    async fn extract(
        &self,
        text: &str,
        schema: &[&str],
        reference_date: NaiveDate,
    ) -> ExtractionOutcome;
}

/// Append-only row storage. Performs no deduplication.
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn name(&self) -> &str;

    /// Append one record, returning its row identifier
    async fn append_record(&self, record: &WorkdayRecord) -> Result<RowId, RecordStoreError>;
}

/// Source of inbound updates
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch one page of updates with `id > query.since`, in any order.
    ///
    /// May confirm every id up to `query.since` upstream.
    async fn fetch_updates(&self, query: &UpdateQuery) -> Result<UpdatePage>;

    /// Download the audio behind a voice update
    async fn download_audio(&self, audio: &AudioRef) -> Result<Vec<u8>>;
}
