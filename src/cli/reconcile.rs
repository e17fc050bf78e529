//! `shaliwood reconcile` - the scheduled batch pass.
//!
//! Meant to be run from cron once a day, e.g.:
//!
//! ```text
//! 0 2 * * * cd /opt/shaliwood && shaliwood reconcile >> /var/log/shaliwood-cron.log 2>&1
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};

use super::{build_processor, build_store};
use crate::adapters::{TelegramClient, TelegramConfig};
use crate::config;
use crate::core::{BatchReconciler, FileCheckpointStore, PassLock};
use crate::domain::{BatchStatistics, ProcessingStatus};

/// Run one reconciliation pass and print its statistics
pub async fn execute(hours_back: u32, no_sheets: bool, json: bool) -> Result<()> {
    let cfg = config::config()?;

    // Held until the pass returns
    let lock = PassLock::acquire(&cfg.lock_path())
        .context("Refusing to start: another reconciliation pass is running")?;
    tracing::debug!(lock = %lock.path().display(), "Pass lock acquired");

    let source = TelegramClient::from_config(TelegramConfig {
        bot_token: cfg.require_telegram_token()?.to_string(),
        timeout_seconds: cfg.timeouts.telegram_seconds,
    })?;
    let processor = build_processor(cfg)?;
    let store = build_store(cfg, no_sheets).await?;
    let checkpoint = FileCheckpointStore::new(cfg.checkpoint_path());

    let reconciler = BatchReconciler::new(
        Arc::new(source),
        Arc::new(processor),
        store,
        Arc::new(checkpoint),
    )
    .with_options(cfg.reconciler_options());

    let stats = reconciler
        .fetch_and_process_recent_messages(hours_back)
        .await
        .context("Reconciliation pass failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_summary(&stats);
    }

    Ok(())
}

fn print_summary(stats: &BatchStatistics) {
    println!();
    println!("Reconciliation Summary ({})", stats.run_id);
    println!("══════════════════════════════════════════════════════════════");
    println!("  Total messages:   {}", stats.total_messages);
    println!("  Voice messages:   {}", stats.voice_messages);
    println!("  Processed voice:  {}", stats.processed_voice);
    println!("  Errors:           {}", stats.errors);
    println!("  Checkpoint:       {} → {}", stats.checkpoint_start, stats.checkpoint_end);
    println!("  Duration:         {:.2}s", stats.duration_seconds());
    if let Some(update_id) = stats.halted_at {
        println!("  ⛔ Stopped at update {} (record store failure; retried next run)", update_id);
    }

    if !stats.messages_processed.is_empty() {
        println!();
        for summary in &stats.messages_processed {
            let tag = match summary.status {
                ProcessingStatus::Success => "OK  ",
                ProcessingStatus::Fallback => "RAW ",
                ProcessingStatus::Failed => "FAIL",
            };
            println!(
                "  [{}] #{} from {} on {}: {}",
                tag, summary.update_id, summary.sender_id, summary.message_date, summary.transcription
            );
            if let Some(ref error) = summary.error {
                println!("         {}", error);
            }
        }
    }
    println!();
}
