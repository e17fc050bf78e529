//! Command-line interface for shaliwood.
//!
//! Provides commands for the scheduled reconciliation pass, local file
//! processing, and inspecting checkpoint and configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::adapters::{
    JsonlRecordStore, OpenAiClient, OpenAiExtractor, RecordStore, ServiceAccountKey,
    SheetsRecordStore, WhisperTranscriber,
};
use crate::config::{self, ResolvedConfig};
use crate::core::{CheckpointStore, FileCheckpointStore, VoiceArchive, VoiceProcessor};
use crate::domain::WorkdayFields;

pub mod file;
pub mod reconcile;

/// shaliwood - voice messages to workday records
#[derive(Parser, Debug)]
#[command(name = "shaliwood")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process recent voice messages past the checkpoint (cron entry point)
    Reconcile {
        /// How many hours back to look (at most 24)
        #[arg(long, default_value = "24")]
        hours_back: u32,

        /// Write records to the local JSONL file instead of Google Sheets
        #[arg(long)]
        no_sheets: bool,

        /// Print the batch statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Process a local audio file
    File {
        /// Path to the audio file
        path: PathBuf,

        /// Only transcribe, skip extraction and storage
        #[arg(long)]
        transcribe_only: bool,

        /// Save the transcription to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write records to the local JSONL file instead of Google Sheets
        #[arg(long)]
        no_sheets: bool,
    },

    /// Show the persisted checkpoint
    Checkpoint,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Reconcile {
                hours_back,
                no_sheets,
                json,
            } => reconcile::execute(hours_back, no_sheets, json).await,
            Commands::File {
                path,
                transcribe_only,
                output,
                no_sheets,
            } => file::execute(&path, transcribe_only, output, no_sheets).await,
            Commands::Checkpoint => show_checkpoint().await,
            Commands::Config => show_config(),
        }
    }
}

/// Build the voice processor from configuration
pub(crate) fn build_processor(cfg: &ResolvedConfig) -> Result<VoiceProcessor> {
    let api_key = cfg.require_openai_api_key()?.to_string();
    let timeouts = cfg.service_timeouts();

    let transcriber = WhisperTranscriber::new(
        OpenAiClient::new(api_key.clone(), timeouts.transcription)?,
        cfg.transcription_model.clone(),
    );
    let extractor = OpenAiExtractor::new(
        OpenAiClient::new(api_key, timeouts.extraction)?,
        cfg.extraction_model.clone(),
    );

    Ok(VoiceProcessor::new(Arc::new(transcriber), Some(Arc::new(extractor)))
        .with_timeouts(timeouts)
        .with_archive(VoiceArchive::new(cfg.voice_save_dir.clone())))
}

/// Build the record store: Google Sheets, or the local JSONL file
pub(crate) async fn build_store(cfg: &ResolvedConfig, no_sheets: bool) -> Result<Arc<dyn RecordStore>> {
    if no_sheets {
        let store = JsonlRecordStore::new(cfg.local_records_path());
        tracing::info!(path = %store.path().display(), "Google Sheets disabled, using local records");
        return Ok(Arc::new(store));
    }

    let key = ServiceAccountKey::from_file(&cfg.credentials_file).await?;
    let store = SheetsRecordStore::new(
        cfg.require_spreadsheet_id()?.to_string(),
        cfg.sheet_range.clone(),
        key,
        Duration::from_secs(cfg.timeouts.append_seconds),
    )?;

    Ok(Arc::new(store))
}

/// Print workday fields, one per line
pub(crate) fn print_fields(fields: &WorkdayFields) {
    println!("📊 Extracted Data:");
    for (name, value) in crate::domain::FIELD_SCHEMA.iter().zip(fields.values()) {
        println!("  {}: {}", name, value);
    }
    println!();
}

/// Show the persisted checkpoint
async fn show_checkpoint() -> Result<()> {
    let cfg = config::config()?;
    let store = FileCheckpointStore::new(cfg.checkpoint_path());
    let checkpoint = store.load().await?;

    println!("Checkpoint file: {}", store.path().display());
    println!("Last accounted-for update: {}", checkpoint);
    if !store.path().exists() {
        println!("  (never written - next pass starts from the beginning of the retention window)");
    }

    Ok(())
}

/// Mask a secret, keeping a short prefix for recognition
fn mask(secret: &Option<String>) -> String {
    match secret {
        Some(s) if s.chars().count() > 4 => format!("{}…", s.chars().take(4).collect::<String>()),
        Some(_) => "****".to_string(),
        None => "(not set)".to_string(),
    }
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("Shaliwood Configuration");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:           {}", cfg.home.display());
    println!("  Checkpoint:     {}", cfg.checkpoint_path().display());
    println!("  Local records:  {}", cfg.local_records_path().display());
    println!("  Voice archive:  {} (enabled: {})", cfg.voice_save_dir.display(), cfg.save_voice_messages);
    println!("  Credentials:    {}", cfg.credentials_file.display());
    println!();
    println!("Services:");
    println!("  Language:       {}", cfg.language);
    println!("  Transcription:  {}", cfg.transcription_model);
    println!("  Extraction:     {}", cfg.extraction_model);
    println!("  Sheet range:    {}", cfg.sheet_range);
    println!();
    println!("Secrets:");
    println!("  TELEGRAM_TOKEN: {}", mask(&cfg.telegram_token));
    println!("  OPENAI_API_KEY: {}", mask(&cfg.openai_api_key));
    println!("  SPREADSHEET_ID: {}", mask(&cfg.spreadsheet_id));
    println!();
    println!("Timeouts:");
    println!("  Transcription:  {}s", cfg.timeouts.transcription_seconds);
    println!("  Extraction:     {}s", cfg.timeouts.extraction_seconds);
    println!("  Append:         {}s", cfg.timeouts.append_seconds);
    println!("  Telegram:       {}s", cfg.timeouts.telegram_seconds);

    Ok(())
}
