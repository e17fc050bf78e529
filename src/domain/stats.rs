//! Aggregate statistics for one reconciliation pass.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{ProcessingResult, ProcessingStatus};
use super::update::Update;

/// Characters of transcription kept in a message summary
pub const SUMMARY_CHARS: usize = 100;

/// Per-message line in the batch summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub update_id: i64,
    pub sender_id: String,
    /// Message date as DD/MM/YYYY
    pub message_date: String,
    /// Transcription, truncated
    pub transcription: String,
    pub has_workday_data: bool,
    pub status: ProcessingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counters and summaries for a pass. Logged, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub run_id: Uuid,
    pub total_messages: u32,
    pub voice_messages: u32,
    pub processed_voice: u32,
    pub errors: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Checkpoint read at the start of the pass
    pub checkpoint_start: i64,
    /// Checkpoint persisted at the end of the pass
    pub checkpoint_end: i64,
    /// Update at which the pass stopped early, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<i64>,
    pub messages_processed: Vec<MessageSummary>,
}

impl BatchStatistics {
    pub fn new(run_id: Uuid, checkpoint: i64) -> Self {
        Self {
            run_id,
            total_messages: 0,
            voice_messages: 0,
            processed_voice: 0,
            errors: 0,
            start_time: Utc::now(),
            end_time: None,
            checkpoint_start: checkpoint,
            checkpoint_end: checkpoint,
            halted_at: None,
            messages_processed: Vec::new(),
        }
    }

    /// Count a voice message that produced a record
    pub fn record_processed(&mut self, update: &Update, result: &ProcessingResult) {
        self.processed_voice += 1;
        self.messages_processed.push(MessageSummary {
            update_id: update.id,
            sender_id: update.sender_label(),
            message_date: message_date(update),
            transcription: truncate_transcription(&result.raw_transcription),
            has_workday_data: result.has_workday_data(),
            status: result.status,
            error: None,
        });
    }

    /// Count a voice message that failed
    pub fn record_failure(&mut self, update: &Update, transcription: &str, error: &str) {
        self.errors += 1;
        self.messages_processed.push(MessageSummary {
            update_id: update.id,
            sender_id: update.sender_label(),
            message_date: message_date(update),
            transcription: truncate_transcription(transcription),
            has_workday_data: false,
            status: ProcessingStatus::Failed,
            error: Some(error.to_string()),
        });
    }

    /// Close the pass
    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// Wall-clock duration of the pass in seconds (0 while running)
    pub fn duration_seconds(&self) -> f64 {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

/// Message date in local time as DD/MM/YYYY
fn message_date(update: &Update) -> String {
    update
        .timestamp
        .with_timezone(&Local)
        .format("%d/%m/%Y")
        .to_string()
}

/// Truncate to [`SUMMARY_CHARS`] characters, appending "..." when cut
pub fn truncate_transcription(text: &str) -> String {
    if text.chars().count() > SUMMARY_CHARS {
        let head: String = text.chars().take(SUMMARY_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
