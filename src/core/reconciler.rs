//! Batch reconciler: replays the recent window of updates against the
//! persisted checkpoint.
//!
//! A pass is strictly sequential. Each update is accounted for in id
//! order and the checkpoint is persisted right after it, so a crash loses
//! at most the update in flight. Pages are pulled one at a time, each from
//! the persisted checkpoint, because fetching confirms updates upstream.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use super::processor::{AudioRequest, VoiceProcessor, DEFAULT_LANGUAGE};
use crate::adapters::{MessageSource, RecordStore, RecordStoreError, RowId};
use crate::domain::{BatchStatistics, ProcessingStatus, Update, UpdateQuery, WorkdayRecord};

/// Errors that abort a whole pass
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Failed to fetch updates: {0:#}")]
    Source(anyhow::Error),
}

/// How a single update was accounted for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Not a voice message; seen, not processed
    Skipped,

    /// A row was appended
    Recorded { row: RowId, status: ProcessingStatus },

    /// The message could not be processed; no row
    Failed { reason: String },

    /// Processing worked but the append did not; the update stays pending
    StoreFailed { reason: String },
}

impl UpdateOutcome {
    /// Whether the checkpoint may move past this update
    pub fn is_accounted_for(&self) -> bool {
        !matches!(self, UpdateOutcome::StoreFailed { .. })
    }
}

/// Tunables for a pass
#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    /// Language hint passed to transcription
    pub language: String,

    /// Archive downloaded audio before processing
    pub archive_audio: bool,

    /// Bound on each record append
    pub append_timeout: Duration,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            archive_audio: false,
            append_timeout: Duration::from_secs(30),
        }
    }
}

/// Drives the voice processor and record store over recent updates
pub struct BatchReconciler {
    source: Arc<dyn MessageSource>,
    processor: Arc<VoiceProcessor>,
    store: Arc<dyn RecordStore>,
    checkpoint: Arc<dyn CheckpointStore>,
    options: ReconcilerOptions,
}

impl BatchReconciler {
    pub fn new(
        source: Arc<dyn MessageSource>,
        processor: Arc<VoiceProcessor>,
        store: Arc<dyn RecordStore>,
        checkpoint: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            source,
            processor,
            store,
            checkpoint,
            options: ReconcilerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReconcilerOptions) -> Self {
        self.options = options;
        self
    }

    /// Run one reconciliation pass over the last `hours_back` hours.
    ///
    /// `hours_back` is clamped to the source's 24-hour retention.
    pub async fn fetch_and_process_recent_messages(
        &self,
        hours_back: u32,
    ) -> Result<BatchStatistics, ReconcileError> {
        let run_id = Uuid::new_v4();
        self.run_pass(run_id, hours_back)
            .instrument(info_span!("reconcile", %run_id))
            .await
    }

    async fn run_pass(&self, run_id: Uuid, hours_back: u32) -> Result<BatchStatistics, ReconcileError> {
        let mut checkpoint = self.checkpoint.load().await?;
        let mut stats = BatchStatistics::new(run_id, checkpoint.value());

        let mut query = UpdateQuery::recent(checkpoint.value(), hours_back, Utc::now());
        if query.window_hours < hours_back {
            info!(
                requested = hours_back,
                window = query.window_hours,
                "Look-back clamped to source retention"
            );
        }
        info!(checkpoint = %checkpoint, window_hours = query.window_hours, "Starting reconciliation pass");

        'pages: loop {
            query.since = checkpoint.value();
            let page = self
                .source
                .fetch_updates(&query)
                .await
                .map_err(ReconcileError::Source)?;
            let pending = pending_in_order(page.updates, checkpoint);
            info!(count = pending.len(), has_more = page.has_more, "Updates pending");

            for update in &pending {
                stats.total_messages += 1;

                let outcome = self.handle_update(update, &mut stats).await;
                log_outcome(update, &outcome);

                if !outcome.is_accounted_for() {
                    stats.halted_at = Some(update.id);
                    break 'pages;
                }

                self.persist(&mut checkpoint, update.id).await?;
                stats.checkpoint_end = checkpoint.value();
            }

            // Ids the query dropped (other kinds, too old) are seen, hence accounted for
            if let Some(last_id) = page.last_id {
                if checkpoint.is_pending(last_id) {
                    self.persist(&mut checkpoint, last_id).await?;
                    stats.checkpoint_end = checkpoint.value();
                }
            }

            // A full page that moved nothing would be fetched again forever
            if !page.has_more || checkpoint.value() <= query.since {
                break;
            }
        }

        stats.finish();
        info!(
            total = stats.total_messages,
            voice = stats.voice_messages,
            processed = stats.processed_voice,
            errors = stats.errors,
            checkpoint = stats.checkpoint_end,
            duration_secs = stats.duration_seconds(),
            "Reconciliation pass completed"
        );

        Ok(stats)
    }

    /// Account for a single update. Never fails the pass.
    async fn handle_update(&self, update: &Update, stats: &mut BatchStatistics) -> UpdateOutcome {
        if !update.is_voice() {
            return UpdateOutcome::Skipped;
        }

        stats.voice_messages += 1;
        info!(update_id = update.id, sender_id = %update.sender_label(), "Processing voice message");

        let audio = match self.download(update).await {
            Ok(audio) => audio,
            Err(e) => {
                let reason = format!("download failed: {:#}", e);
                stats.record_failure(update, "", &reason);
                return UpdateOutcome::Failed { reason };
            }
        };

        let request = AudioRequest {
            language: self.options.language.clone(),
            reference_date: Some(update.timestamp.with_timezone(&Local).date_naive()),
            sender: update.sender_label(),
            archive: self.options.archive_audio,
        };

        let result = self.processor.process_audio(&audio, &request).await;

        let Some(record) = WorkdayRecord::from_result(&result) else {
            let reason = result.error.unwrap_or_else(|| "processing failed".to_string());
            stats.record_failure(update, "", &reason);
            return UpdateOutcome::Failed { reason };
        };

        match self.append(&record).await {
            Ok(row) => {
                stats.record_processed(update, &result);
                UpdateOutcome::Recorded {
                    row,
                    status: result.status,
                }
            }
            Err(e) => {
                let reason = e.to_string();
                error!(
                    update_id = update.id,
                    store = self.store.name(),
                    %reason,
                    transcription = %result.raw_transcription,
                    "Failed to append workday record"
                );
                stats.record_failure(update, &result.raw_transcription, &reason);
                UpdateOutcome::StoreFailed { reason }
            }
        }
    }

    /// Advance and persist the checkpoint. A failure here aborts the pass.
    async fn persist(&self, checkpoint: &mut Checkpoint, update_id: i64) -> Result<(), ReconcileError> {
        checkpoint.advance(update_id);
        if let Err(e) = self.checkpoint.save(*checkpoint).await {
            error!(update_id, error = %e, "Failed to persist checkpoint, aborting pass");
            return Err(e.into());
        }
        Ok(())
    }

    async fn download(&self, update: &Update) -> anyhow::Result<Vec<u8>> {
        let audio_ref = update
            .audio_ref
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("voice update {} has no audio reference", update.id))?;
        self.source.download_audio(audio_ref).await
    }

    async fn append(&self, record: &WorkdayRecord) -> Result<RowId, RecordStoreError> {
        let limit = self.options.append_timeout;
        timeout(limit, self.store.append_record(record))
            .await
            .map_err(|_| RecordStoreError::Timeout(limit))?
    }
}

fn log_outcome(update: &Update, outcome: &UpdateOutcome) {
    match outcome {
        UpdateOutcome::Skipped => {
            debug!(update_id = update.id, kind = %update.kind, "Skipping non-voice update")
        }
        UpdateOutcome::Recorded { row, status } => {
            info!(update_id = update.id, %status, %row, "Workday record appended")
        }
        UpdateOutcome::Failed { reason } => {
            warn!(update_id = update.id, %reason, "Voice message failed")
        }
        UpdateOutcome::StoreFailed { reason } => warn!(
            update_id = update.id,
            %reason,
            "Stopping pass; update will be retried on the next run"
        ),
    }
}

/// Updates past the checkpoint, ascending by id, without duplicates
pub fn pending_in_order(mut updates: Vec<Update>, checkpoint: Checkpoint) -> Vec<Update> {
    updates.retain(|u| checkpoint.is_pending(u.id));
    updates.sort_by_key(|u| u.id);
    updates.dedup_by_key(|u| u.id);
    updates
}
