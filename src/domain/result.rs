//! Outcome of running one audio payload through the pipeline.

use serde::{Deserialize, Serialize};

use super::workday::WorkdayFields;

/// Status of a processing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Transcribed and extracted
    Success,

    /// Transcribed, but structured extraction did not succeed
    Fallback,

    /// Transcription failed; nothing to salvage
    Failed,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStatus::Success => write!(f, "success"),
            ProcessingStatus::Fallback => write!(f, "fallback"),
            ProcessingStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of [`crate::core::VoiceProcessor::process_audio`].
///
/// `error` is set iff `status` is `Failed`, and `raw_transcription` is empty
/// only in that case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub status: ProcessingStatus,
    pub raw_transcription: String,
    pub fields: WorkdayFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingResult {
    pub fn success(raw_transcription: String, fields: WorkdayFields) -> Self {
        Self {
            status: ProcessingStatus::Success,
            raw_transcription,
            fields,
            error: None,
        }
    }

    pub fn fallback(raw_transcription: String) -> Self {
        Self {
            status: ProcessingStatus::Fallback,
            raw_transcription,
            fields: WorkdayFields::default(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ProcessingStatus::Failed,
            raw_transcription: String::new(),
            fields: WorkdayFields::default(),
            error: Some(error.into()),
        }
    }

    /// Whether the result can become a record
    pub fn is_recordable(&self) -> bool {
        self.status != ProcessingStatus::Failed
    }

    /// Whether structured fields were obtained
    pub fn has_workday_data(&self) -> bool {
        self.status == ProcessingStatus::Success && !self.fields.is_empty()
    }
}
