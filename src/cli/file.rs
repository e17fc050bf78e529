//! `shaliwood file` - process a local audio file.
//!
//! Runs the same processor as the batch pass. The file's modification
//! time stands in for the message timestamp.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate};

use super::{build_processor, build_store, print_fields};
use crate::config;
use crate::core::AudioRequest;
use crate::domain::{ProcessingStatus, WorkdayRecord};

/// Reference date for a local recording: its modification date, local time
pub fn file_reference_date(path: &Path) -> Result<NaiveDate> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read modification time: {}", path.display()))?;
    Ok(DateTime::<Local>::from(modified).date_naive())
}

pub async fn execute(
    path: &Path,
    transcribe_only: bool,
    output: Option<PathBuf>,
    no_sheets: bool,
) -> Result<()> {
    if !path.is_file() {
        bail!("Audio file not found: {}", path.display());
    }

    let cfg = config::config()?;
    let processor = build_processor(cfg)?;

    let audio = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read audio file: {}", path.display()))?;

    println!("🎤 Processing: {}", path.display());

    if transcribe_only {
        let text = processor
            .transcribe_only(&audio, &cfg.language)
            .await
            .context("Transcription failed")?;
        print_transcription(&text);
        return write_output(output, &text).await;
    }

    let request = AudioRequest {
        language: cfg.language.clone(),
        reference_date: Some(file_reference_date(path)?),
        sender: "local".to_string(),
        archive: false,
    };
    let result = processor.process_audio(&audio, &request).await;

    if result.status == ProcessingStatus::Failed {
        bail!(
            "Processing failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }

    print_transcription(&result.raw_transcription);
    match result.status {
        ProcessingStatus::Success => print_fields(&result.fields),
        _ => println!("⚠️  Extraction unavailable, keeping raw transcription only\n"),
    }

    if let Some(record) = WorkdayRecord::from_result(&result) {
        let store = build_store(cfg, no_sheets).await?;
        let row = store
            .append_record(&record)
            .await
            .with_context(|| format!("Failed to append record to {}", store.name()))?;
        println!("✅ Record appended ({}: {})", store.name(), row);
    }

    write_output(output, &result.raw_transcription).await
}

fn print_transcription(text: &str) {
    println!();
    println!("📝 Transcription:");
    println!("{}", text);
    println!();
}

async fn write_output(output: Option<PathBuf>, text: &str) -> Result<()> {
    if let Some(path) = output {
        tokio::fs::write(&path, text)
            .await
            .with_context(|| format!("Failed to write transcription: {}", path.display()))?;
        println!("💾 Transcription saved to {}", path.display());
    }
    Ok(())
}
